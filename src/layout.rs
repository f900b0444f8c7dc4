//! Per-object layout plan: derived properties every emitter and the decoder agree on.

use crate::schema::{FieldKind, ObjectDefinition, ObjectKey, Schema};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPlan {
    pub key: ObjectKey,
    /// Bits carried in packed bit-field groups (8 per group), or the point width of a packed object.
    pub packed_bits: u32,
    /// Record start offset must be snapshotted for prefix-derived lengths.
    pub tracks_offset: bool,
    /// Owned buffers the release routine must free, in declaration order.
    pub freeable: Vec<String>,
    /// Bytes a record needs at minimum, excluding its prefix and variable data.
    pub min_record_size: usize,
    /// Record size when no field is variable-length.
    pub fixed_record_size: Option<usize>,
}

impl ObjectPlan {
    pub fn for_object(object: &ObjectDefinition) -> Self {
        let packed_bits = match object.packed {
            Some(w) => w.bits() as u32,
            None => object
                .fields
                .iter()
                .filter(|f| matches!(f.kind, FieldKind::Bstr8(_)))
                .count() as u32
                * 8,
        };
        let freeable = object
            .fields
            .iter()
            .filter(|f| f.kind.is_freeable())
            .map(|f| f.name.clone())
            .collect();
        let min_record_size = object
            .fields
            .iter()
            .filter_map(|f| f.kind.fixed_wire_size())
            .sum();
        let fixed_record_size = object
            .fields
            .iter()
            .map(|f| f.kind.fixed_wire_size())
            .sum::<Option<usize>>();
        ObjectPlan {
            key: object.key,
            packed_bits,
            tracks_offset: object.tracks_offset,
            freeable,
            min_record_size,
            fixed_record_size,
        }
    }

    pub fn has_freeable_fields(&self) -> bool {
        !self.freeable.is_empty()
    }
}

/// Plans for every generated object, in schema order.
#[derive(Debug, Clone)]
pub struct LayoutPlan {
    pub objects: Vec<ObjectPlan>,
}

impl LayoutPlan {
    pub fn new(schema: &Schema) -> Self {
        LayoutPlan {
            objects: schema.objects().iter().map(ObjectPlan::for_object).collect(),
        }
    }

    pub fn get(&self, key: ObjectKey) -> Option<&ObjectPlan> {
        self.objects.iter().find(|p| p.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_str;

    const SRC: &str = r#"
objects:
  - group: 12
    variation: 1
    fields:
      - type: bstr8
        fields:
          - name: op_type
            width: 4
          - name: qu
            width: 1
          - name: cr
            width: 1
          - name: tcc
            width: 2
      - type: uint8
        name: count
      - type: uint32
        name: ontime
      - type: uint32
        name: offtime
      - type: bstr8
        fields:
          - name: status_code
            width: 7
          - name: reserved
            width: 1
  - group: 120
    variation: 1
    constraints:
      require_size_prefix: true
    fields:
      - type: uint32
        name: csq
      - type: uint16
        name: usr
      - type: bytearray
        name: challenge_data
        len_from_prefix: true
        len_field: challenge_data_len
    extra_fields:
      - type: uint16
        name: challenge_data_len
"#;

    #[test]
    fn fixed_record_sizes() {
        let schema = load_str(SRC).expect("load");
        let plan = LayoutPlan::new(&schema);
        let crob = plan.get(ObjectKey::new(12, 1)).expect("g12v1");
        assert_eq!(crob.packed_bits, 16);
        assert_eq!(crob.fixed_record_size, Some(11));
        assert!(!crob.tracks_offset);
        assert!(!crob.has_freeable_fields());
    }

    #[test]
    fn prefix_length_marks_offset_and_freeable() {
        let schema = load_str(SRC).expect("load");
        let plan = LayoutPlan::new(&schema);
        let g120 = plan.get(ObjectKey::new(120, 1)).expect("g120v1");
        assert!(g120.tracks_offset);
        assert_eq!(g120.freeable, vec!["challenge_data".to_string()]);
        assert_eq!(g120.min_record_size, 6);
        assert_eq!(g120.fixed_record_size, None);
    }
}
