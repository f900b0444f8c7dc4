//! Schema model for DNP3 objects: group/variation pairs with typed, wire-ordered fields.
//!
//! The model is built once by the [loader](crate::loader) and is immutable afterwards. Every
//! emitter and the runtime [codec](crate::codec) consume the same types, so wire-format knowledge
//! (widths, storage, ownership) lives here and nowhere else.

use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a DNP3 object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub group: u8,
    pub variation: u8,
}

impl ObjectKey {
    pub fn new(group: u8, variation: u8) -> Self {
        ObjectKey { group, variation }
    }

    /// Combined 16-bit object code, group in the high byte.
    pub fn code(&self) -> u16 {
        (self.group as u16) << 8 | self.variation as u16
    }

    /// Storage type name in the downstream engine, e.g. `DNP3ObjectG12V1`.
    pub fn type_name(&self) -> String {
        format!("DNP3ObjectG{}V{}", self.group, self.variation)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.variation)
    }
}

/// Fixed-width integer types. Signed and unsigned 8/16/24/32/64-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntType {
    U8,
    U16,
    U24,
    U32,
    U64,
    I8,
    I16,
    I24,
    I32,
    I64,
}

impl IntType {
    /// Bytes occupied on the wire.
    pub fn wire_size(&self) -> usize {
        match self {
            IntType::U8 | IntType::I8 => 1,
            IntType::U16 | IntType::I16 => 2,
            IntType::U24 | IntType::I24 => 3,
            IntType::U32 | IntType::I32 => 4,
            IntType::U64 | IntType::I64 => 8,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            IntType::I8 | IntType::I16 | IntType::I24 | IntType::I32 | IntType::I64
        )
    }

    /// Largest unsigned value the storage can hold (24-bit types are stored widened).
    pub fn storage_max(&self) -> u64 {
        match self {
            IntType::U8 => u8::MAX as u64,
            IntType::U16 => u16::MAX as u64,
            IntType::U24 | IntType::U32 => u32::MAX as u64,
            IntType::U64 => u64::MAX,
            IntType::I8 => i8::MAX as u64,
            IntType::I16 => i16::MAX as u64,
            IntType::I24 | IntType::I32 => i32::MAX as u64,
            IntType::I64 => i64::MAX as u64,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            IntType::U8 => "uint8",
            IntType::U16 => "uint16",
            IntType::U24 => "uint24",
            IntType::U32 => "uint32",
            IntType::U64 => "uint64",
            IntType::I8 => "int8",
            IntType::I16 => "int16",
            IntType::I24 => "int24",
            IntType::I32 => "int32",
            IntType::I64 => "int64",
        }
    }
}

/// Where a variable-length field gets its runtime length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthSpec {
    /// Sibling integer field holding the runtime length.
    pub field: String,
    /// Length is `prefix - bytes consumed since record start`, written into `field`.
    pub from_prefix: bool,
}

/// One sub-byte field of a packed bit-field group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitField {
    pub name: String,
    pub width: u8,
}

impl BitField {
    pub fn mask(&self) -> u8 {
        bit_mask(self.width)
    }
}

/// Low `width` bits set.
pub fn bit_mask(width: u8) -> u8 {
    if width >= 8 {
        0xff
    } else {
        (1u8 << width) - 1
    }
}

/// Field kinds. Closed set; each kind has one wire encoding and one storage representation.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Int(IntType),
    Flt32,
    Flt64,
    /// 48 bits on the wire, 64-bit storage.
    Timestamp,
    /// Fixed 4-byte text, stored in a 5-byte terminated buffer.
    Vstr4,
    /// Variable text stored in a fixed buffer of `size` bytes.
    CharArray { size: usize, len: LengthSpec },
    /// Variable bytes in an owned buffer.
    ByteArray { len: LengthSpec },
    /// Eight bits split into subfields, LSB first.
    Bstr8(Vec<BitField>),
}

impl FieldKind {
    /// Schema tag for the kind, as written in the schema file.
    pub fn tag(&self) -> &'static str {
        match self {
            FieldKind::Int(t) => t.tag(),
            FieldKind::Flt32 => "flt32",
            FieldKind::Flt64 => "flt64",
            FieldKind::Timestamp => "dnp3time",
            FieldKind::Vstr4 => "vstr4",
            FieldKind::CharArray { .. } => "chararray",
            FieldKind::ByteArray { .. } => "bytearray",
            FieldKind::Bstr8(_) => "bstr8",
        }
    }

    /// Wire size when it does not depend on runtime data.
    pub fn fixed_wire_size(&self) -> Option<usize> {
        match self {
            FieldKind::Int(t) => Some(t.wire_size()),
            FieldKind::Flt32 => Some(4),
            FieldKind::Flt64 => Some(8),
            FieldKind::Timestamp => Some(6),
            FieldKind::Vstr4 => Some(4),
            FieldKind::Bstr8(_) => Some(1),
            FieldKind::CharArray { .. } | FieldKind::ByteArray { .. } => None,
        }
    }

    /// Integer-valued storage (timestamps included), pushed as plain integers by the serializers.
    pub fn is_integer(&self) -> bool {
        matches!(self, FieldKind::Int(_) | FieldKind::Timestamp)
    }

    /// Owned heap storage that the release routine must free.
    pub fn is_freeable(&self) -> bool {
        matches!(self, FieldKind::ByteArray { .. })
    }

    pub fn length(&self) -> Option<&LengthSpec> {
        match self {
            FieldKind::CharArray { len, .. } | FieldKind::ByteArray { len } => Some(len),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub kind: FieldKind,
}

/// Integer field appended after the main fields; never read from the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraField {
    pub name: String,
    pub kind: FieldKind,
}

/// Precondition checked once before any point of the object is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// Prefix code must be one of the size-encoding codes.
    RequireSizePrefix,
    /// Prefix code must equal this value.
    RequirePrefixCode(u8),
}

/// Bits per point in a packed (bitmap) object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackedWidth {
    One,
    Two,
}

impl PackedWidth {
    pub fn bits(&self) -> u8 {
        match self {
            PackedWidth::One => 1,
            PackedWidth::Two => 2,
        }
    }

    pub fn mask(&self) -> u8 {
        bit_mask(self.bits())
    }

    pub fn points_per_octet(&self) -> u32 {
        8 / self.bits() as u32
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDefinition {
    pub key: ObjectKey,
    /// Wire order.
    pub fields: Vec<FieldDefinition>,
    pub extra_fields: Vec<ExtraField>,
    pub constraints: Vec<Constraint>,
    /// `Some` when the object is a repeating bitmap of single-field points.
    pub packed: Option<PackedWidth>,
    /// Set when any field's length derives from the record's size prefix.
    pub tracks_offset: bool,
}

impl ObjectDefinition {
    pub fn is_packed(&self) -> bool {
        self.packed.is_some()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn extra_field(&self, name: &str) -> Option<&ExtraField> {
        self.extra_fields.iter().find(|f| f.name == name)
    }

    /// Integer type of a main or extra field, if it is an integer.
    pub fn int_type_of(&self, name: &str) -> Option<IntType> {
        let kind = self
            .field(name)
            .map(|f| &f.kind)
            .or_else(|| self.extra_field(name).map(|f| &f.kind))?;
        match kind {
            FieldKind::Int(t) => Some(*t),
            _ => None,
        }
    }

    pub fn has_freeable_fields(&self) -> bool {
        self.fields.iter().any(|f| f.kind.is_freeable())
    }
}

/// Object excluded from generation, with the reason given in the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unimplemented {
    pub key: ObjectKey,
    pub reason: String,
}

/// Validated schema: objects in schema order plus a lookup by key.
#[derive(Debug, Clone)]
pub struct Schema {
    objects: Vec<ObjectDefinition>,
    by_key: BTreeMap<ObjectKey, usize>,
    unimplemented: Vec<Unimplemented>,
}

impl Schema {
    /// Build from already-validated objects. Keys must be unique.
    pub(crate) fn new(objects: Vec<ObjectDefinition>, unimplemented: Vec<Unimplemented>) -> Self {
        let by_key = objects
            .iter()
            .enumerate()
            .map(|(i, o)| (o.key, i))
            .collect();
        Schema {
            objects,
            by_key,
            unimplemented,
        }
    }

    pub fn objects(&self) -> &[ObjectDefinition] {
        &self.objects
    }

    pub fn get(&self, key: ObjectKey) -> Option<&ObjectDefinition> {
        self.by_key.get(&key).map(|&i| &self.objects[i])
    }

    pub fn unimplemented(&self) -> &[Unimplemented] {
        &self.unimplemented
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
