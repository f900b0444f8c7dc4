//! Load and validate DNP3 object definitions from parsed schema data.
//!
//! Input is the already-parsed schema document (a mapping with an `objects` sequence). Every
//! object and field key is checked against a closed allow-list; anything else fails with a
//! diagnostic naming the object. Objects carrying an `unimplemented` marker are reported and
//! dropped without failing the rest of the schema.

use crate::schema::*;
use serde_yaml::{Mapping, Value as Yaml};
use std::collections::HashSet;

/// Keys accepted at object level.
pub const OBJECT_KEYS: &[&str] = &[
    "group",
    "variation",
    "constraints",
    "extra_fields",
    "fields",
    "packed",
];

/// Keys accepted on a main field. Which of them apply depends on the field type.
pub const FIELD_KEYS: &[&str] = &[
    "type",
    "name",
    "width",
    "len_from_prefix",
    "len_field",
    "fields",
    "size",
];

/// Keys accepted on a bit-field subfield.
const SUBFIELD_KEYS: &[&str] = &["name", "width"];

/// Keys accepted on an extra field.
const EXTRA_FIELD_KEYS: &[&str] = &["type", "name"];

const UNIMPLEMENTED_KEY: &str = "unimplemented";

/// Widths an embedded bit-field subfield may have.
const SUBFIELD_WIDTHS: &[u8] = &[1, 2, 4, 7];

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("schema: {0}")]
    Structure(String),
    #[error("object #{index}: missing or invalid '{key}'")]
    MissingObjectKey { index: usize, key: &'static str },
    #[error("duplicate object {0}")]
    DuplicateObject(ObjectKey),
    #[error("invalid key '{key}' in object {object}")]
    InvalidObjectKey { object: ObjectKey, key: String },
    #[error("invalid key '{key}' in field '{field}' of object {object}")]
    InvalidFieldKey {
        object: ObjectKey,
        field: String,
        key: String,
    },
    #[error("object {object}: field '{field}': missing or invalid '{attr}'")]
    MissingAttribute {
        object: ObjectKey,
        field: String,
        attr: &'static str,
    },
    #[error("unknown datatype '{ty}' for field '{field}' of object {object}")]
    UnknownType {
        object: ObjectKey,
        field: String,
        ty: String,
    },
    #[error("object {object}: extra field '{field}' cannot have type '{ty}'")]
    UnsupportedExtraField {
        object: ObjectKey,
        field: String,
        ty: String,
    },
    #[error("object {object}: unknown constraint '{name}'")]
    UnknownConstraint { object: ObjectKey, name: String },
    #[error("object {object}: bit-field widths of '{field}' sum to {sum}, expected 8")]
    BitWidthSum {
        object: ObjectKey,
        field: String,
        sum: u32,
    },
    #[error("object {object}: unsupported width {width} for '{field}'")]
    UnsupportedWidth {
        object: ObjectKey,
        field: String,
        width: u64,
    },
    #[error("object {object}: duplicate field name '{field}'")]
    DuplicateField { object: ObjectKey, field: String },
    #[error("object {object}: field '{field}': length field '{len_field}' {reason}")]
    BadLengthField {
        object: ObjectKey,
        field: String,
        len_field: String,
        reason: &'static str,
    },
    #[error("object {object}: packed objects need exactly one integer field with a width: {reason}")]
    BadPacked { object: ObjectKey, reason: String },
}

/// Parse schema text and load it.
pub fn load_str(source: &str) -> Result<Schema, SchemaError> {
    let doc: Yaml = serde_yaml::from_str(source)?;
    load(&doc)
}

/// Load a parsed schema document.
pub fn load(doc: &Yaml) -> Result<Schema, SchemaError> {
    let entries = doc
        .get("objects")
        .and_then(Yaml::as_sequence)
        .ok_or_else(|| SchemaError::Structure("expected a top-level 'objects' sequence".to_string()))?;
    tracing::info!("Loaded {} objects.", entries.len());

    let mut objects = Vec::new();
    let mut unimplemented = Vec::new();
    let mut seen = HashSet::new();

    for (index, entry) in entries.iter().enumerate() {
        let map = entry.as_mapping().ok_or_else(|| {
            SchemaError::Structure(format!("object #{} is not a mapping", index))
        })?;
        let key = object_key(map, index)?;
        if !seen.insert(key) {
            return Err(SchemaError::DuplicateObject(key));
        }
        if let Some(reason) = map.get(UNIMPLEMENTED_KEY) {
            let reason = scalar_text(reason);
            tracing::warn!("Object not implemented: {}: {}", key, reason);
            unimplemented.push(Unimplemented { key, reason });
            continue;
        }
        objects.push(build_object(key, map)?);
    }

    Ok(Schema::new(objects, unimplemented))
}

fn object_key(map: &Mapping, index: usize) -> Result<ObjectKey, SchemaError> {
    let group = get_u8(map, "group").ok_or(SchemaError::MissingObjectKey {
        index,
        key: "group",
    })?;
    let variation = get_u8(map, "variation").ok_or(SchemaError::MissingObjectKey {
        index,
        key: "variation",
    })?;
    Ok(ObjectKey::new(group, variation))
}

fn build_object(key: ObjectKey, map: &Mapping) -> Result<ObjectDefinition, SchemaError> {
    for k in map.keys() {
        let k = scalar_text(k);
        if !OBJECT_KEYS.contains(&k.as_str()) {
            return Err(SchemaError::InvalidObjectKey { object: key, key: k });
        }
    }

    let raw_fields = map
        .get("fields")
        .and_then(Yaml::as_sequence)
        .ok_or(SchemaError::MissingAttribute {
            object: key,
            field: String::new(),
            attr: "fields",
        })?;

    let mut fields = Vec::with_capacity(raw_fields.len());
    // Width on a packed object's single field, kept aside until `packed` is known.
    let mut point_width = None;
    for (i, raw) in raw_fields.iter().enumerate() {
        let (field, width) = build_field(key, i, raw)?;
        if let Some(w) = width {
            point_width = Some((field.name.clone(), w));
        }
        fields.push(field);
    }

    let extra_fields = match map.get("extra_fields") {
        None | Some(Yaml::Null) => Vec::new(),
        Some(v) => {
            let seq = v.as_sequence().ok_or(SchemaError::MissingAttribute {
                object: key,
                field: String::new(),
                attr: "extra_fields",
            })?;
            seq.iter()
                .map(|raw| build_extra_field(key, raw))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let constraints = match map.get("constraints") {
        None | Some(Yaml::Null) => Vec::new(),
        Some(v) => build_constraints(key, v)?,
    };

    let packed = if get_bool(key, "", map, "packed")?.unwrap_or(false) {
        Some(packed_width(key, &fields, point_width.map(|(_, w)| w))?)
    } else {
        if let Some((field, _)) = point_width {
            return Err(SchemaError::InvalidFieldKey {
                object: key,
                field,
                key: "width".to_string(),
            });
        }
        None
    };

    let tracks_offset = fields
        .iter()
        .any(|f| f.kind.length().map(|l| l.from_prefix).unwrap_or(false));

    let object = ObjectDefinition {
        key,
        fields,
        extra_fields,
        constraints,
        packed,
        tracks_offset,
    };
    check_names(&object)?;
    check_lengths(&object)?;
    Ok(object)
}

/// Build one main field. Returns the `width` attribute too, which only packed objects use.
fn build_field(
    key: ObjectKey,
    index: usize,
    raw: &Yaml,
) -> Result<(FieldDefinition, Option<u8>), SchemaError> {
    let map = raw.as_mapping().ok_or(SchemaError::MissingAttribute {
        object: key,
        field: format!("#{}", index),
        attr: "fields",
    })?;
    let ty = get_str(map, "type");
    // Bit-field groups may go unnamed: their subfields carry the names.
    let name = match (get_str(map, "name"), ty.as_deref()) {
        (Some(n), _) => n,
        (None, Some("bstr8")) => format!("bstr8_{}", index),
        (None, _) => {
            return Err(SchemaError::MissingAttribute {
                object: key,
                field: format!("#{}", index),
                attr: "name",
            })
        }
    };
    check_keys(key, &name, map, FIELD_KEYS)?;
    let ty = ty.ok_or_else(|| SchemaError::MissingAttribute {
        object: key,
        field: name.clone(),
        attr: "type",
    })?;

    let kind = match ty.as_str() {
        "chararray" => FieldKind::CharArray {
            size: get_u64(map, "size").ok_or_else(|| SchemaError::MissingAttribute {
                object: key,
                field: name.clone(),
                attr: "size",
            })? as usize,
            len: length_spec(key, &name, map)?,
        },
        "bytearray" => FieldKind::ByteArray {
            len: length_spec(key, &name, map)?,
        },
        "bstr8" => FieldKind::Bstr8(build_subfields(key, &name, map)?),
        other => scalar_kind(other).ok_or_else(|| SchemaError::UnknownType {
            object: key,
            field: name.clone(),
            ty: ty.clone(),
        })?,
    };
    check_kind_keys(key, &name, &kind, map)?;

    let width = match map.get("width") {
        None => None,
        Some(w) => Some(
            w.as_u64()
                .and_then(|w| u8::try_from(w).ok())
                .ok_or_else(|| SchemaError::MissingAttribute {
                    object: key,
                    field: name.clone(),
                    attr: "width",
                })?,
        ),
    };

    Ok((FieldDefinition { name, kind }, width))
}

fn build_subfields(
    key: ObjectKey,
    group_name: &str,
    map: &Mapping,
) -> Result<Vec<BitField>, SchemaError> {
    let seq = map
        .get("fields")
        .and_then(Yaml::as_sequence)
        .ok_or_else(|| SchemaError::MissingAttribute {
            object: key,
            field: group_name.to_string(),
            attr: "fields",
        })?;
    let mut subfields = Vec::with_capacity(seq.len());
    let mut sum = 0u32;
    for raw in seq {
        let sub = raw.as_mapping().ok_or_else(|| SchemaError::MissingAttribute {
            object: key,
            field: group_name.to_string(),
            attr: "fields",
        })?;
        let name = get_str(sub, "name").ok_or_else(|| SchemaError::MissingAttribute {
            object: key,
            field: group_name.to_string(),
            attr: "name",
        })?;
        check_keys(key, &name, sub, SUBFIELD_KEYS)?;
        let width = get_u64(sub, "width").ok_or_else(|| SchemaError::MissingAttribute {
            object: key,
            field: name.clone(),
            attr: "width",
        })?;
        if !SUBFIELD_WIDTHS.iter().any(|&w| w as u64 == width) {
            return Err(SchemaError::UnsupportedWidth {
                object: key,
                field: name,
                width,
            });
        }
        sum += width as u32;
        subfields.push(BitField {
            name,
            width: width as u8,
        });
    }
    if sum != 8 {
        return Err(SchemaError::BitWidthSum {
            object: key,
            field: group_name.to_string(),
            sum,
        });
    }
    Ok(subfields)
}

fn build_extra_field(key: ObjectKey, raw: &Yaml) -> Result<ExtraField, SchemaError> {
    let map = raw.as_mapping().ok_or(SchemaError::MissingAttribute {
        object: key,
        field: String::new(),
        attr: "extra_fields",
    })?;
    let name = get_str(map, "name").ok_or(SchemaError::MissingAttribute {
        object: key,
        field: String::new(),
        attr: "name",
    })?;
    check_keys(key, &name, map, EXTRA_FIELD_KEYS)?;
    let ty = get_str(map, "type").ok_or_else(|| SchemaError::MissingAttribute {
        object: key,
        field: name.clone(),
        attr: "type",
    })?;
    match ty.as_str() {
        "chararray" | "bytearray" | "bstr8" => Err(SchemaError::UnsupportedExtraField {
            object: key,
            field: name,
            ty,
        }),
        other => match scalar_kind(other) {
            Some(kind) => Ok(ExtraField { name, kind }),
            None => Err(SchemaError::UnknownType {
                object: key,
                field: name,
                ty,
            }),
        },
    }
}

fn build_constraints(key: ObjectKey, v: &Yaml) -> Result<Vec<Constraint>, SchemaError> {
    let map = v.as_mapping().ok_or(SchemaError::MissingAttribute {
        object: key,
        field: String::new(),
        attr: "constraints",
    })?;
    let mut out = Vec::new();
    for (k, val) in map {
        let name = scalar_text(k);
        match name.as_str() {
            "require_size_prefix" => {
                let required = val.as_bool().ok_or(SchemaError::MissingAttribute {
                    object: key,
                    field: String::new(),
                    attr: "require_size_prefix",
                })?;
                if required {
                    out.push(Constraint::RequireSizePrefix);
                }
            }
            "require_prefix_code" => {
                let code = val
                    .as_u64()
                    .and_then(|c| u8::try_from(c).ok())
                    .ok_or(SchemaError::MissingAttribute {
                        object: key,
                        field: String::new(),
                        attr: "require_prefix_code",
                    })?;
                out.push(Constraint::RequirePrefixCode(code));
            }
            _ => return Err(SchemaError::UnknownConstraint { object: key, name }),
        }
    }
    Ok(out)
}

fn packed_width(
    key: ObjectKey,
    fields: &[FieldDefinition],
    width: Option<u8>,
) -> Result<PackedWidth, SchemaError> {
    let bad = |reason: &str| SchemaError::BadPacked {
        object: key,
        reason: reason.to_string(),
    };
    if fields.len() != 1 {
        return Err(bad(&format!("found {} fields", fields.len())));
    }
    if !matches!(fields[0].kind, FieldKind::Int(_)) {
        return Err(bad(&format!("field type is '{}'", fields[0].kind.tag())));
    }
    match width {
        Some(1) => Ok(PackedWidth::One),
        Some(2) => Ok(PackedWidth::Two),
        Some(w) => Err(SchemaError::UnsupportedWidth {
            object: key,
            field: fields[0].name.clone(),
            width: w as u64,
        }),
        None => Err(bad("missing width")),
    }
}

fn length_spec(key: ObjectKey, name: &str, map: &Mapping) -> Result<LengthSpec, SchemaError> {
    let field = get_str(map, "len_field").ok_or_else(|| SchemaError::MissingAttribute {
        object: key,
        field: name.to_string(),
        attr: "len_field",
    })?;
    let from_prefix = get_bool(key, name, map, "len_from_prefix")?.unwrap_or(false);
    Ok(LengthSpec { field, from_prefix })
}

/// Reject attributes that do not apply to the field's kind.
fn check_kind_keys(
    key: ObjectKey,
    name: &str,
    kind: &FieldKind,
    map: &Mapping,
) -> Result<(), SchemaError> {
    let applies = |attr: &str| match attr {
        "size" => matches!(kind, FieldKind::CharArray { .. }),
        "len_field" | "len_from_prefix" => kind.length().is_some(),
        "fields" => matches!(kind, FieldKind::Bstr8(_)),
        "width" => matches!(kind, FieldKind::Int(_)),
        _ => true,
    };
    for k in map.keys() {
        let k = scalar_text(k);
        if !applies(&k) {
            return Err(SchemaError::InvalidFieldKey {
                object: key,
                field: name.to_string(),
                key: k,
            });
        }
    }
    Ok(())
}

fn check_keys(
    key: ObjectKey,
    name: &str,
    map: &Mapping,
    allowed: &[&str],
) -> Result<(), SchemaError> {
    for k in map.keys() {
        let k = scalar_text(k);
        if !allowed.contains(&k.as_str()) {
            return Err(SchemaError::InvalidFieldKey {
                object: key,
                field: name.to_string(),
                key: k,
            });
        }
    }
    Ok(())
}

/// Storage names are flat: main fields, bit-field subfields and extra fields share one namespace.
fn check_names(object: &ObjectDefinition) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    let mut names: Vec<&str> = Vec::new();
    for f in &object.fields {
        match &f.kind {
            FieldKind::Bstr8(subs) => names.extend(subs.iter().map(|s| s.name.as_str())),
            _ => names.push(&f.name),
        }
    }
    names.extend(object.extra_fields.iter().map(|f| f.name.as_str()));
    for n in names {
        if !seen.insert(n) {
            return Err(SchemaError::DuplicateField {
                object: object.key,
                field: n.to_string(),
            });
        }
    }
    Ok(())
}

/// A stored length must precede its field on the wire; a prefix-derived one may live anywhere,
/// extra fields included, since the decoder writes it.
fn check_lengths(object: &ObjectDefinition) -> Result<(), SchemaError> {
    for (i, f) in object.fields.iter().enumerate() {
        let Some(len) = f.kind.length() else {
            continue;
        };
        let err = |reason| SchemaError::BadLengthField {
            object: object.key,
            field: f.name.clone(),
            len_field: len.field.clone(),
            reason,
        };
        if object.int_type_of(&len.field).is_none() {
            return Err(err("is not an integer field of the object"));
        }
        if !len.from_prefix {
            let earlier = object.fields[..i].iter().any(|p| p.name == len.field);
            if !earlier {
                return Err(err("must be an earlier field"));
            }
        }
    }
    Ok(())
}

fn scalar_kind(tag: &str) -> Option<FieldKind> {
    Some(match tag {
        "uint8" => FieldKind::Int(IntType::U8),
        "uint16" => FieldKind::Int(IntType::U16),
        "uint24" => FieldKind::Int(IntType::U24),
        "uint32" => FieldKind::Int(IntType::U32),
        "uint64" => FieldKind::Int(IntType::U64),
        "int8" => FieldKind::Int(IntType::I8),
        "int16" => FieldKind::Int(IntType::I16),
        "int24" => FieldKind::Int(IntType::I24),
        "int32" => FieldKind::Int(IntType::I32),
        "int64" => FieldKind::Int(IntType::I64),
        "flt32" => FieldKind::Flt32,
        "flt64" => FieldKind::Flt64,
        "dnp3time" => FieldKind::Timestamp,
        "vstr4" => FieldKind::Vstr4,
        _ => return None,
    })
}

fn get_str(map: &Mapping, key: &str) -> Option<String> {
    map.get(key).and_then(Yaml::as_str).map(str::to_string)
}

/// `None` when absent; present values must be booleans.
fn get_bool(
    object: ObjectKey,
    field: &str,
    map: &Mapping,
    attr: &'static str,
) -> Result<Option<bool>, SchemaError> {
    match map.get(attr) {
        None => Ok(None),
        Some(v) => v.as_bool().map(Some).ok_or_else(|| SchemaError::MissingAttribute {
            object,
            field: field.to_string(),
            attr,
        }),
    }
}

fn get_u64(map: &Mapping, key: &str) -> Option<u64> {
    map.get(key).and_then(Yaml::as_u64)
}

fn get_u8(map: &Mapping, key: &str) -> Option<u8> {
    get_u64(map, key).and_then(|v| u8::try_from(v).ok())
}

/// Text of a scalar key or value, for diagnostics.
fn scalar_text(v: &Yaml) -> String {
    match v {
        Yaml::String(s) => s.clone(),
        Yaml::Bool(b) => b.to_string(),
        Yaml::Number(n) => n.to_string(),
        Yaml::Null => String::new(),
        other => format!("{:?}", other),
    }
}
