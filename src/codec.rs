//! Decode DNP3 object points from the wire using the schema model.
//!
//! This is the same algorithm the generated C decoders implement, run directly over the
//! [`ObjectDefinition`]s: bounds-checked little-endian cursor reads, bit-field extraction,
//! prefix-derived lengths, and release of the partially built point on failure. Points produced
//! before a failure stay in the caller's list.
//!
//! Decoding holds no shared state; a [`Decoder`] can be used from several threads at once.

use crate::schema::*;
use crate::value::Value;
use byteorder::{ByteOrder, LittleEndian};

/// Prefix codes (object header qualifier "prefix" nibble).
pub const PREFIX_NONE: u8 = 0x00;
pub const PREFIX_INDEX_U8: u8 = 0x01;
pub const PREFIX_INDEX_U16: u8 = 0x02;
pub const PREFIX_INDEX_U32: u8 = 0x03;
pub const PREFIX_SIZE_U8: u8 = 0x04;
pub const PREFIX_SIZE_U16: u8 = 0x05;
pub const PREFIX_SIZE_U32: u8 = 0x06;

/// Bytes a prefix occupies for the given code. Unknown codes carry no prefix.
pub fn prefix_len(prefix_code: u8) -> usize {
    match prefix_code {
        PREFIX_INDEX_U8 | PREFIX_SIZE_U8 => 1,
        PREFIX_INDEX_U16 | PREFIX_SIZE_U16 => 2,
        PREFIX_INDEX_U32 | PREFIX_SIZE_U32 => 4,
        _ => 0,
    }
}

/// Prefix encodes the record size in bytes rather than a point index.
pub fn prefix_is_size(prefix_code: u8) -> bool {
    matches!(prefix_code, PREFIX_SIZE_U8 | PREFIX_SIZE_U16 | PREFIX_SIZE_U32)
}

/// Outcome of [`Decoder::decode_object`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Ok,
    UnknownObject,
    Malformed,
}

impl Signal {
    /// Application layer event code: 0 on success.
    pub fn event_code(&self) -> u8 {
        match self {
            Signal::Ok => 0,
            Signal::Malformed => EVENT_MALFORMED,
            Signal::UnknownObject => EVENT_UNKNOWN_OBJECT,
        }
    }
}

pub const EVENT_MALFORMED: u8 = 5;
pub const EVENT_UNKNOWN_OBJECT: u8 = 6;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("need {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("prefix code {0:#04x} does not encode a size")]
    PrefixNotSize(u8),
    #[error("prefix code {actual:#04x}, expected {expected:#04x}")]
    PrefixCode { actual: u8, expected: u8 },
    #[error("field {field}: {consumed} bytes consumed exceed prefix {prefix}")]
    PrefixUnderflow {
        field: String,
        prefix: u32,
        consumed: usize,
    },
    #[error("field {field}: length {len} does not fit a {size}-byte buffer")]
    TextOverflow {
        field: String,
        len: i64,
        size: usize,
    },
    #[error("field {field}: length {len} does not fit in {len_field}")]
    LengthOverflow {
        field: String,
        len_field: String,
        len: u64,
    },
}

/// Storage of one point: every field slot of the object, in storage order.
#[derive(Debug, Clone, PartialEq)]
pub struct PointData {
    pub key: ObjectKey,
    fields: Vec<(String, Value)>,
}

impl PointData {
    /// Zero-initialised storage: integers 0, text and byte buffers empty.
    pub fn zeroed(object: &ObjectDefinition) -> Self {
        let mut fields = Vec::new();
        for f in &object.fields {
            match &f.kind {
                FieldKind::Bstr8(subs) => {
                    fields.extend(subs.iter().map(|s| (s.name.clone(), Value::U8(0))))
                }
                kind => fields.push((f.name.clone(), zero_value(kind))),
            }
        }
        for f in &object.extra_fields {
            fields.push((f.name.clone(), zero_value(&f.kind)));
        }
        PointData {
            key: object.key,
            fields,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    fn set(&mut self, name: &str, value: Value) {
        if let Some((_, slot)) = self.fields.iter_mut().find(|(n, _)| n == name) {
            *slot = value;
        }
    }
}

/// One decoded point with its addressing.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub index: u32,
    pub prefix_code: u8,
    pub prefix: u32,
    pub data: PointData,
}

pub type PointList = Vec<Point>;

/// Dispatches decodes by (group, variation) over a validated schema.
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'s> {
    schema: &'s Schema,
}

impl<'s> Decoder<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Decoder { schema }
    }

    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    /// Decode `count` points of an object starting at point index `start`.
    ///
    /// `buf` is advanced past every byte consumed, including those of a record that failed.
    #[allow(clippy::too_many_arguments)]
    pub fn decode_object(
        &self,
        group: u8,
        variation: u8,
        buf: &mut &[u8],
        prefix_code: u8,
        start: u32,
        count: u32,
        points: &mut PointList,
    ) -> Signal {
        let key = ObjectKey::new(group, variation);
        let Some(object) = self.schema.get(key) else {
            return Signal::UnknownObject;
        };
        match decode_points(object, buf, prefix_code, start, count, points) {
            Ok(()) => Signal::Ok,
            Err(e) => {
                tracing::debug!("Malformed object {}: {}", key, e);
                Signal::Malformed
            }
        }
    }

    /// Release a successfully decoded point. Owned buffers go with it.
    pub fn release_point(&self, group: u8, variation: u8, point: Point) {
        let key = ObjectKey::new(group, variation);
        if point.data.key != key {
            tracing::debug!("Releasing {} point as {}", point.data.key, key);
        }
        drop(point);
    }
}

/// Decode points of a single object; the per-object routine behind [`Decoder::decode_object`].
pub fn decode_points(
    object: &ObjectDefinition,
    buf: &mut &[u8],
    prefix_code: u8,
    start: u32,
    count: u32,
    points: &mut PointList,
) -> Result<(), DecodeError> {
    check_constraints(object, prefix_code)?;
    let mut wire = Wire { buf };
    match object.packed {
        Some(width) => decode_packed(object, width, &mut wire, prefix_code, start, count, points),
        None => decode_records(object, &mut wire, prefix_code, start, count, points),
    }
}

fn check_constraints(object: &ObjectDefinition, prefix_code: u8) -> Result<(), DecodeError> {
    for c in &object.constraints {
        match *c {
            Constraint::RequireSizePrefix if !prefix_is_size(prefix_code) => {
                return Err(DecodeError::PrefixNotSize(prefix_code))
            }
            Constraint::RequirePrefixCode(expected) if prefix_code != expected => {
                return Err(DecodeError::PrefixCode {
                    actual: prefix_code,
                    expected,
                })
            }
            _ => {}
        }
    }
    Ok(())
}

fn decode_packed(
    object: &ObjectDefinition,
    width: PackedWidth,
    wire: &mut Wire<'_, '_>,
    prefix_code: u8,
    start: u32,
    count: u32,
    points: &mut PointList,
) -> Result<(), DecodeError> {
    // Loader guarantees a single integer field.
    let field = &object.fields[0];
    let ty = match field.kind {
        FieldKind::Int(t) => t,
        _ => IntType::U8,
    };
    let prefix = wire.read_prefix(prefix_code)?;
    let mut remaining = count;
    let mut index = start;
    while remaining > 0 {
        let octet = wire.read_u8()?;
        let mut shift = 0;
        while shift < 8 && remaining > 0 {
            let mut data = PointData::zeroed(object);
            let bits = (octet >> shift) & width.mask();
            data.set(&field.name, int_value(ty, bits as u64));
            points.push(Point {
                index,
                prefix_code,
                prefix,
                data,
            });
            remaining -= 1;
            index = index.wrapping_add(1);
            shift += width.bits();
        }
    }
    Ok(())
}

fn decode_records(
    object: &ObjectDefinition,
    wire: &mut Wire<'_, '_>,
    prefix_code: u8,
    start: u32,
    count: u32,
    points: &mut PointList,
) -> Result<(), DecodeError> {
    let mut index = start;
    for _ in 0..count {
        // A failed read drops `data`, releasing whatever it already owns.
        let mut data = PointData::zeroed(object);
        let prefix = wire.read_prefix(prefix_code)?;
        let record_start = wire.remaining();
        for field in &object.fields {
            let ctx = RecordContext {
                object,
                prefix,
                record_start,
            };
            decode_field(wire, field, &mut data, &ctx)?;
        }
        points.push(Point {
            index,
            prefix_code,
            prefix,
            data,
        });
        index = index.wrapping_add(1);
    }
    Ok(())
}

struct RecordContext<'o> {
    object: &'o ObjectDefinition,
    prefix: u32,
    /// Remaining bytes right after the record's prefix.
    record_start: usize,
}

fn decode_field(
    wire: &mut Wire<'_, '_>,
    field: &FieldDefinition,
    data: &mut PointData,
    ctx: &RecordContext<'_>,
) -> Result<(), DecodeError> {
    let value = match &field.kind {
        FieldKind::Int(t) => {
            let n = t.wire_size();
            if t.is_signed() {
                signed_value(*t, wire.read_int(n)?)
            } else {
                int_value(*t, wire.read_uint(n)?)
            }
        }
        FieldKind::Flt32 => Value::Float(f32::from_bits(wire.read_uint(4)? as u32)),
        FieldKind::Flt64 => Value::Double(f64::from_bits(wire.read_uint(8)?)),
        FieldKind::Timestamp => Value::Time(wire.read_uint(6)?),
        FieldKind::Vstr4 => Value::Text(wire.take(4)?.to_vec()),
        FieldKind::CharArray { size, len } => {
            let n = runtime_len(wire, field, len, data, ctx)?;
            // A negative signed length fails the unsigned size comparison.
            let fits = u64::try_from(n).map(|n| n < *size as u64).unwrap_or(false);
            if !fits {
                return Err(DecodeError::TextOverflow {
                    field: field.name.clone(),
                    len: n,
                    size: *size,
                });
            }
            Value::Text(wire.take(n as usize)?.to_vec())
        }
        FieldKind::ByteArray { len } => {
            // Lengths of zero or below carry no data.
            let n = runtime_len(wire, field, len, data, ctx)?.max(0);
            Value::Bytes(wire.take(usize::try_from(n).unwrap_or(usize::MAX))?.to_vec())
        }
        FieldKind::Bstr8(subs) => {
            let octet = wire.read_u8()?;
            let mut shift = 0;
            for sub in subs {
                data.set(&sub.name, Value::U8((octet >> shift) & sub.mask()));
                shift += sub.width;
            }
            return Ok(());
        }
    };
    data.set(&field.name, value);
    Ok(())
}

/// Runtime length of a variable field, written back to its length field when prefix-derived.
///
/// A stored length keeps its sign: signed length fields may hold negative values.
fn runtime_len(
    wire: &Wire<'_, '_>,
    field: &FieldDefinition,
    len: &LengthSpec,
    data: &mut PointData,
    ctx: &RecordContext<'_>,
) -> Result<i64, DecodeError> {
    if !len.from_prefix {
        return Ok(data.get(&len.field).map(stored_len).unwrap_or(0));
    }
    let consumed = ctx.record_start - wire.remaining();
    let n = (ctx.prefix as u64)
        .checked_sub(consumed as u64)
        .ok_or_else(|| DecodeError::PrefixUnderflow {
            field: field.name.clone(),
            prefix: ctx.prefix,
            consumed,
        })?;
    let ty = ctx.object.int_type_of(&len.field).unwrap_or(IntType::U32);
    if n > ty.storage_max() {
        return Err(DecodeError::LengthOverflow {
            field: field.name.clone(),
            len_field: len.field.clone(),
            len: n,
        });
    }
    data.set(&len.field, int_value(ty, n));
    Ok(n as i64)
}

/// Length held in an integer field, signed or unsigned.
fn stored_len(v: &Value) -> i64 {
    match v.as_u64() {
        Some(n) => i64::try_from(n).unwrap_or(i64::MAX),
        None => v.as_i64().unwrap_or(0),
    }
}

fn zero_value(kind: &FieldKind) -> Value {
    match kind {
        FieldKind::Int(t) if t.is_signed() => signed_value(*t, 0),
        FieldKind::Int(t) => int_value(*t, 0),
        FieldKind::Flt32 => Value::Float(0.0),
        FieldKind::Flt64 => Value::Double(0.0),
        FieldKind::Timestamp => Value::Time(0),
        FieldKind::Vstr4 | FieldKind::CharArray { .. } => Value::Text(Vec::new()),
        FieldKind::ByteArray { .. } => Value::Bytes(Vec::new()),
        FieldKind::Bstr8(_) => Value::U8(0),
    }
}

/// Store an unsigned quantity in the storage type of `ty`.
fn int_value(ty: IntType, v: u64) -> Value {
    match ty {
        IntType::U8 => Value::U8(v as u8),
        IntType::U16 => Value::U16(v as u16),
        IntType::U24 | IntType::U32 => Value::U32(v as u32),
        IntType::U64 => Value::U64(v),
        IntType::I8 | IntType::I16 | IntType::I24 | IntType::I32 | IntType::I64 => {
            signed_value(ty, v as i64)
        }
    }
}

fn signed_value(ty: IntType, v: i64) -> Value {
    match ty {
        IntType::I8 => Value::I8(v as i8),
        IntType::I16 => Value::I16(v as i16),
        IntType::I24 | IntType::I32 => Value::I32(v as i32),
        IntType::I64 => Value::I64(v),
        _ => int_value(ty, v as u64),
    }
}

/// Bounds-checked little-endian reader advancing the caller's slice in place.
struct Wire<'b, 'a> {
    buf: &'b mut &'a [u8],
}

impl<'b, 'a> Wire<'b, 'a> {
    fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let buf: &'a [u8] = *self.buf;
        if buf.len() < n {
            return Err(DecodeError::Truncated {
                needed: n,
                remaining: buf.len(),
            });
        }
        let (head, tail) = buf.split_at(n);
        *self.buf = tail;
        Ok(head)
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn read_uint(&mut self, n: usize) -> Result<u64, DecodeError> {
        Ok(LittleEndian::read_uint(self.take(n)?, n))
    }

    fn read_int(&mut self, n: usize) -> Result<i64, DecodeError> {
        Ok(LittleEndian::read_int(self.take(n)?, n))
    }

    fn read_prefix(&mut self, prefix_code: u8) -> Result<u32, DecodeError> {
        match prefix_len(prefix_code) {
            0 => Ok(0),
            n => Ok(self.read_uint(n)? as u32),
        }
    }
}
