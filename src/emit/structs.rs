//! Storage struct per object, fields in declared order, extra fields appended.

use super::EmitError;
use crate::schema::{FieldKind, IntType, ObjectDefinition, Schema};
use std::fmt::Write;

pub fn emit(schema: &Schema) -> Result<String, EmitError> {
    let mut out = String::from("\n");
    for object in schema.objects() {
        emit_object(&mut out, object)?;
    }
    Ok(out)
}

fn emit_object(out: &mut String, object: &ObjectDefinition) -> Result<(), EmitError> {
    let name = object.key.type_name();
    writeln!(out, "typedef struct {}_ {{", name)?;
    for field in &object.fields {
        match &field.kind {
            FieldKind::Bstr8(subs) => {
                for sub in subs {
                    writeln!(out, "    uint8_t {}:{};", sub.name, sub.width)?;
                }
            }
            FieldKind::ByteArray { .. } => writeln!(out, "    uint8_t *{};", field.name)?,
            FieldKind::Vstr4 => writeln!(out, "    char {}[5];", field.name)?,
            FieldKind::CharArray { size, .. } => {
                writeln!(out, "    char {}[{}];", field.name, size)?
            }
            kind => writeln!(out, "    {} {};", scalar_c_type(kind), field.name)?,
        }
    }
    for extra in &object.extra_fields {
        let ty = match extra.kind {
            FieldKind::Int(IntType::U8) => "uint8_t",
            FieldKind::Int(IntType::U16) => "uint16_t",
            FieldKind::Int(IntType::U32) => "uint32_t",
            _ => {
                return Err(EmitError::UnsupportedExtraType {
                    object: object.key,
                    field: extra.name.clone(),
                    ty: extra.kind.tag(),
                })
            }
        };
        writeln!(out, "    {} {};", ty, extra.name)?;
    }
    writeln!(out, "}} {};", name)?;
    writeln!(out)?;
    Ok(())
}

/// C storage type of fixed-width kinds.
pub(crate) fn scalar_c_type(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Int(t) => match t {
            IntType::U8 => "uint8_t",
            IntType::U16 => "uint16_t",
            IntType::U24 | IntType::U32 => "uint32_t",
            IntType::U64 => "uint64_t",
            IntType::I8 => "int8_t",
            IntType::I16 => "int16_t",
            IntType::I24 | IntType::I32 => "int32_t",
            IntType::I64 => "int64_t",
        },
        FieldKind::Flt32 => "float",
        FieldKind::Flt64 => "double",
        FieldKind::Timestamp => "uint64_t",
        FieldKind::Bstr8(_) => "uint8_t",
        FieldKind::Vstr4 | FieldKind::CharArray { .. } => "char",
        FieldKind::ByteArray { .. } => "uint8_t *",
    }
}
