//! Serialize decoded points for a scripting host and as JSON.
//!
//! Both share one switch over [`FieldKind`]: integers map to integers, floats to numbers, bit-field
//! subfields are flattened to individual integer entries. They differ in how byte data travels:
//! the binding keeps text and bytes as length-bounded strings, JSON base64-encodes byte arrays.

use crate::codec::{Point, PointData};
use crate::schema::{FieldKind, ObjectDefinition, Schema};
use crate::value::Value;
use base64::Engine;
use serde_json::{Map, Number, Value as Json};

/// A value pushed onto the scripting host's stack.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingValue {
    Integer(i64),
    Number(f64),
    /// Length-bounded string; may contain NUL bytes.
    Str(Vec<u8>),
}

/// Key/value entries for one point, in field order. Extra fields are not exported.
pub fn binding_entries(object: &ObjectDefinition, data: &PointData) -> Vec<(String, BindingValue)> {
    let mut out = Vec::new();
    for field in &object.fields {
        match &field.kind {
            FieldKind::Bstr8(subs) => {
                for sub in subs {
                    let v = data.get(&sub.name).and_then(Value::as_i64).unwrap_or(0);
                    out.push((sub.name.clone(), BindingValue::Integer(v)));
                }
            }
            kind => {
                let Some(v) = data.get(&field.name) else {
                    continue;
                };
                let entry = if kind.is_integer() {
                    BindingValue::Integer(v.as_i64().unwrap_or(0))
                } else {
                    match kind {
                        FieldKind::Flt32 | FieldKind::Flt64 => {
                            BindingValue::Number(v.as_f64().unwrap_or(0.0))
                        }
                        _ => BindingValue::Str(v.as_bytes().unwrap_or_default().to_vec()),
                    }
                };
                out.push((field.name.clone(), entry));
            }
        }
    }
    out
}

/// Add a point's fields to `js`. Unknown objects are skipped without error.
pub fn set_json_item(js: &mut Map<String, Json>, schema: &Schema, point: &Point) {
    let Some(object) = schema.get(point.data.key) else {
        tracing::debug!("Unknown object: {}", point.data.key);
        return;
    };
    for field in &object.fields {
        match &field.kind {
            FieldKind::Bstr8(subs) => {
                for sub in subs {
                    let v = point.data.get(&sub.name).and_then(Value::as_u64).unwrap_or(0);
                    js.insert(sub.name.clone(), Json::from(v));
                }
            }
            kind => {
                if let Some(v) = point.data.get(&field.name) {
                    js.insert(field.name.clone(), json_value(kind, v));
                }
            }
        }
    }
}

/// JSON object for a point, or `None` when the object is not in the schema.
pub fn point_to_json(schema: &Schema, point: &Point) -> Option<Json> {
    schema.get(point.data.key)?;
    let mut js = Map::new();
    set_json_item(&mut js, schema, point);
    Some(Json::Object(js))
}

fn json_value(kind: &FieldKind, v: &Value) -> Json {
    match kind {
        FieldKind::Flt32 | FieldKind::Flt64 => v
            .as_f64()
            .and_then(Number::from_f64)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        FieldKind::ByteArray { .. } => {
            let b64 = base64::engine::general_purpose::STANDARD;
            Json::String(b64.encode(v.as_bytes().unwrap_or_default()))
        }
        // Text ends at the first NUL, as it does once copied into a C string.
        FieldKind::Vstr4 | FieldKind::CharArray { .. } => {
            let b = v.as_bytes().unwrap_or_default();
            let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
            Json::String(String::from_utf8_lossy(&b[..end]).into_owned())
        }
        _ => match v {
            Value::I8(_) | Value::I16(_) | Value::I32(_) | Value::I64(_) => {
                Json::from(v.as_i64().unwrap_or(0))
            }
            _ => Json::from(v.as_u64().unwrap_or(0)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Decoder;
    use crate::loader::load_str;

    const SRC: &str = r#"
objects:
  - group: 83
    variation: 1
    fields:
      - type: vstr4
        name: vendor_code
      - type: uint16
        name: object_id
      - type: uint16
        name: length
      - type: bytearray
        name: data_objects
        len_field: length
"#;

    #[test]
    fn json_base64_bytes_and_text() {
        let schema = load_str(SRC).expect("load");
        let decoder = Decoder::new(&schema);
        let bytes = [b'A', b'B', b'C', b'D', 0x07, 0x00, 0x03, 0x00, 1, 2, 3];
        let mut buf = &bytes[..];
        let mut points = Vec::new();
        decoder.decode_object(83, 1, &mut buf, 0, 0, 1, &mut points);
        let js = point_to_json(&schema, &points[0]).expect("known object");
        assert_eq!(js["vendor_code"], "ABCD");
        assert_eq!(js["object_id"], 7);
        assert_eq!(js["length"], 3);
        assert_eq!(js["data_objects"], "AQID");
    }

    #[test]
    fn binding_keeps_bytes_length_bounded() {
        let schema = load_str(SRC).expect("load");
        let decoder = Decoder::new(&schema);
        let bytes = [b'A', 0, b'C', b'D', 0x01, 0x00, 0x02, 0x00, 0, 9];
        let mut buf = &bytes[..];
        let mut points = Vec::new();
        decoder.decode_object(83, 1, &mut buf, 0, 0, 1, &mut points);
        let object = schema.objects().first().expect("object");
        let entries = binding_entries(object, &points[0].data);
        assert_eq!(entries[0], ("vendor_code".to_string(), BindingValue::Str(b"A\0CD".to_vec())));
        assert_eq!(entries[3], ("data_objects".to_string(), BindingValue::Str(vec![0, 9])));
    }

    const FLAGGED: &str = r#"
objects:
  - group: 30
    variation: 5
    fields:
      - type: bstr8
        fields:
          - name: online
            width: 1
          - name: reserved
            width: 7
      - type: flt32
        name: value
  - group: 70
    variation: 2
    fields:
      - type: uint8
        name: text_len
      - type: chararray
        name: text
        size: 16
        len_field: text_len
"#;

    fn decode_one(schema: &Schema, group: u8, variation: u8, bytes: &[u8]) -> Point {
        let decoder = Decoder::new(schema);
        let mut buf = bytes;
        let mut points = Vec::new();
        decoder.decode_object(group, variation, &mut buf, 0, 0, 1, &mut points);
        points.pop().expect("point")
    }

    #[test]
    fn bit_fields_flatten_and_floats_stay_numbers() {
        let schema = load_str(FLAGGED).expect("load");
        let point = decode_one(&schema, 30, 5, &[0b0000_0101, 0x00, 0x00, 0x20, 0x40]);
        let object = schema.get(point.data.key).expect("object");
        let entries = binding_entries(object, &point.data);
        assert_eq!(
            entries,
            vec![
                ("online".to_string(), BindingValue::Integer(1)),
                ("reserved".to_string(), BindingValue::Integer(2)),
                ("value".to_string(), BindingValue::Number(2.5)),
            ]
        );

        let js = point_to_json(&schema, &point).expect("known object");
        assert_eq!(js["online"], 1);
        assert_eq!(js["reserved"], 2);
        assert_eq!(js["value"], 2.5);
        assert!(js.get("bstr8_0").is_none());
    }

    #[test]
    fn empty_text_serializes_as_empty_string() {
        let schema = load_str(FLAGGED).expect("load");
        let point = decode_one(&schema, 70, 2, &[0x00]);
        let js = point_to_json(&schema, &point).expect("known object");
        assert_eq!(js["text_len"], 0);
        assert_eq!(js["text"], "");
    }

    #[test]
    fn unknown_object_leaves_json_untouched() {
        let schema = load_str(FLAGGED).expect("load");
        let mut point = decode_one(&schema, 30, 5, &[0x01, 0x00, 0x00, 0x80, 0x3F]);
        point.data.key = crate::schema::ObjectKey::new(99, 9);

        let mut js = Map::new();
        js.insert("index".to_string(), Json::from(4));
        set_json_item(&mut js, &schema, &point);
        assert_eq!(js.len(), 1);
        assert_eq!(js["index"], 4);
        assert!(point_to_json(&schema, &point).is_none());
    }
}
