//! Decode routine per object plus the `DNP3DecodeObject` dispatch.
//!
//! Generated routines follow the same algorithm as [`crate::codec`]: packed objects read one
//! prefix then octets until `count` points exist; record objects allocate a point, read its
//! prefix, then every field in wire order. Any failed read jumps to `error`, which frees the point
//! under construction and returns 0.

use super::{case_label, EmitError};
use crate::layout::{LayoutPlan, ObjectPlan};
use crate::schema::*;
use std::fmt::Write;

const SIGNATURE_ARGS: &str = "const uint8_t **buf, uint32_t *len,\n    uint8_t prefix_code, uint32_t start, uint32_t count,\n    DNP3PointList *points";

pub fn emit_routines(schema: &Schema, plan: &LayoutPlan) -> Result<String, EmitError> {
    let mut out = String::from("\n");
    for object in schema.objects() {
        let object_plan = plan
            .get(object.key)
            .ok_or(EmitError::MissingPlan { object: object.key })?;
        match object.packed {
            Some(width) => emit_packed(&mut out, object, width)?,
            None => emit_records(&mut out, object, object_plan)?,
        }
    }
    Ok(out)
}

/// Exhaustive over the schema's objects; anything else is an unknown object.
pub fn emit_dispatch(schema: &Schema) -> Result<String, EmitError> {
    let mut out = String::new();
    writeln!(out, "/**")?;
    writeln!(out, " * \\brief Decode a DNP3 object.")?;
    writeln!(out, " *")?;
    writeln!(out, " * \\retval 0 on success. On failure a positive integer corresponding")?;
    writeln!(out, " *     to a DNP3 application layer event will be returned.")?;
    writeln!(out, " */")?;
    writeln!(out, "int DNP3DecodeObject(int group, int variation, const uint8_t **buf,")?;
    writeln!(out, "    uint32_t *len, uint8_t prefix_code, uint32_t start,")?;
    writeln!(out, "    uint32_t count, DNP3PointList *points)")?;
    writeln!(out, "{{")?;
    writeln!(out, "    int rc = 0;")?;
    writeln!(out)?;
    writeln!(out, "    switch (DNP3_OBJECT_CODE(group, variation)) {{")?;
    for object in schema.objects() {
        writeln!(out, "        case {}:", case_label(object.key))?;
        writeln!(
            out,
            "            rc = {}(buf, len, prefix_code, start, count,",
            routine_name(object.key)
        )?;
        writeln!(out, "                points);")?;
        writeln!(out, "            break;")?;
    }
    writeln!(out, "        default:")?;
    writeln!(out, "            return DNP3_DECODER_EVENT_UNKNOWN_OBJECT;")?;
    writeln!(out, "    }}")?;
    writeln!(out)?;
    writeln!(out, "    return rc ? 0 : DNP3_DECODER_EVENT_MALFORMED;")?;
    writeln!(out, "}}")?;
    writeln!(out)?;
    Ok(out)
}

pub fn routine_name(key: ObjectKey) -> String {
    format!("DNP3DecodeObjectG{}V{}", key.group, key.variation)
}

fn emit_header(out: &mut String, object: &ObjectDefinition) -> Result<(), EmitError> {
    writeln!(
        out,
        "static int {}({})",
        routine_name(object.key),
        SIGNATURE_ARGS
    )?;
    writeln!(out, "{{")?;
    writeln!(out, "    {} *object = NULL;", object.key.type_name())?;
    Ok(())
}

/// Error path releases the point under construction, owned buffers first.
fn emit_footer(out: &mut String, freeable: &[String]) -> Result<(), EmitError> {
    writeln!(out, "    return 1;")?;
    writeln!(out, "error:")?;
    writeln!(out, "    if (object != NULL) {{")?;
    for name in freeable {
        writeln!(out, "        if (object->{} != NULL) {{", name)?;
        writeln!(out, "            SCFree(object->{});", name)?;
        writeln!(out, "        }}")?;
    }
    writeln!(out, "        SCFree(object);")?;
    writeln!(out, "    }}")?;
    writeln!(out)?;
    writeln!(out, "    return 0;")?;
    writeln!(out, "}}")?;
    writeln!(out)?;
    Ok(())
}

fn emit_packed(
    out: &mut String,
    object: &ObjectDefinition,
    width: PackedWidth,
) -> Result<(), EmitError> {
    let field = &object.fields[0];
    emit_header(out, object)?;
    writeln!(out, "    uint32_t prefix = 0;")?;
    writeln!(out, "    uint32_t index = start;")?;
    emit_constraints(out, object)?;
    writeln!(out)?;
    writeln!(out, "    if (!DNP3ReadPrefix(buf, len, prefix_code, &prefix)) {{")?;
    writeln!(out, "        goto error;")?;
    writeln!(out, "    }}")?;
    writeln!(out)?;
    writeln!(out, "    while (count) {{")?;
    writeln!(out)?;
    writeln!(out, "        uint8_t octet;")?;
    writeln!(out)?;
    writeln!(out, "        if (!DNP3ReadUint8(buf, len, &octet)) {{")?;
    writeln!(out, "            goto error;")?;
    writeln!(out, "        }}")?;
    writeln!(out)?;
    writeln!(
        out,
        "        for (int j = 0; j < 8 && count; j = j + {}) {{",
        width.bits()
    )?;
    writeln!(out)?;
    writeln!(out, "            object = SCCalloc(1, sizeof(*object));")?;
    writeln!(out, "            if (unlikely(object == NULL)) {{")?;
    writeln!(out, "                goto error;")?;
    writeln!(out, "            }}")?;
    writeln!(out)?;
    writeln!(
        out,
        "            object->{} = (octet >> j) & {:#x};",
        field.name,
        width.mask()
    )?;
    writeln!(out)?;
    writeln!(
        out,
        "            if (!DNP3AddPoint(points, object, index, prefix_code, prefix)) {{"
    )?;
    writeln!(out, "                goto error;")?;
    writeln!(out, "            }}")?;
    writeln!(out)?;
    writeln!(out, "            object = NULL;")?;
    writeln!(out, "            count--;")?;
    writeln!(out, "            index++;")?;
    writeln!(out, "        }}")?;
    writeln!(out)?;
    writeln!(out, "    }}")?;
    writeln!(out)?;
    emit_footer(out, &[])
}

fn emit_records(
    out: &mut String,
    object: &ObjectDefinition,
    plan: &ObjectPlan,
) -> Result<(), EmitError> {
    emit_header(out, object)?;
    writeln!(out, "    uint32_t prefix = 0;")?;
    writeln!(out, "    uint32_t index = start;")?;
    if plan.tracks_offset {
        writeln!(out, "    uint32_t offset;")?;
    }
    emit_constraints(out, object)?;
    writeln!(out)?;
    writeln!(out, "    while (count--) {{")?;
    writeln!(out)?;
    writeln!(out, "        object = SCCalloc(1, sizeof(*object));")?;
    writeln!(out, "        if (unlikely(object == NULL)) {{")?;
    writeln!(out, "            goto error;")?;
    writeln!(out, "        }}")?;
    writeln!(out)?;
    writeln!(out, "        if (!DNP3ReadPrefix(buf, len, prefix_code, &prefix)) {{")?;
    writeln!(out, "            goto error;")?;
    writeln!(out, "        }}")?;
    if plan.tracks_offset {
        writeln!(out)?;
        writeln!(out, "        offset = *len;")?;
    }
    writeln!(out)?;
    for field in &object.fields {
        emit_field(out, object, field)?;
    }
    writeln!(out)?;
    writeln!(
        out,
        "        if (!DNP3AddPoint(points, object, index, prefix_code, prefix)) {{"
    )?;
    writeln!(out, "            goto error;")?;
    writeln!(out, "        }}")?;
    writeln!(out)?;
    writeln!(out, "        object = NULL;")?;
    writeln!(out, "        index++;")?;
    writeln!(out, "    }}")?;
    writeln!(out)?;
    emit_footer(out, &plan.freeable)
}

fn emit_constraints(out: &mut String, object: &ObjectDefinition) -> Result<(), EmitError> {
    if object.constraints.is_empty() {
        return Ok(());
    }
    writeln!(out)?;
    for c in &object.constraints {
        match c {
            Constraint::RequireSizePrefix => {
                writeln!(out, "    if (!DNP3PrefixIsSize(prefix_code)) {{")?;
            }
            Constraint::RequirePrefixCode(code) => {
                writeln!(out, "    if (prefix_code != {}) {{", code)?;
            }
        }
        writeln!(out, "        goto error;")?;
        writeln!(out, "    }}")?;
    }
    Ok(())
}

/// `if (!<read>) { goto error; }` at record indentation.
fn emit_read(out: &mut String, call: &str) -> Result<(), EmitError> {
    writeln!(out, "        if (!{}) {{", call)?;
    writeln!(out, "            goto error;")?;
    writeln!(out, "        }}")?;
    Ok(())
}

fn emit_field(
    out: &mut String,
    object: &ObjectDefinition,
    field: &FieldDefinition,
) -> Result<(), EmitError> {
    let name = &field.name;
    match &field.kind {
        FieldKind::Int(IntType::I24) => {
            writeln!(out, "        {{")?;
            writeln!(out, "            uint32_t raw;")?;
            writeln!(out, "            if (!DNP3ReadUint24(buf, len, &raw)) {{")?;
            writeln!(out, "                goto error;")?;
            writeln!(out, "            }}")?;
            writeln!(out, "            object->{} = (int32_t)(raw << 8) >> 8;", name)?;
            writeln!(out, "        }}")?;
        }
        FieldKind::Int(t) => {
            let (reader, cast) = int_reader(*t);
            emit_read(
                out,
                &format!("{}(buf, len, {}&object->{})", reader, cast, name),
            )?;
        }
        FieldKind::Flt32 => emit_read(
            out,
            &format!("DNP3ReadUint32(buf, len, (uint32_t *)&object->{})", name),
        )?,
        FieldKind::Flt64 => emit_read(
            out,
            &format!("DNP3ReadUint64(buf, len, (uint64_t *)&object->{})", name),
        )?,
        FieldKind::Timestamp => emit_read(
            out,
            &format!("DNP3ReadUint48(buf, len, &object->{})", name),
        )?,
        FieldKind::Vstr4 => {
            writeln!(out, "        if (*len < 4) {{")?;
            writeln!(out, "            goto error;")?;
            writeln!(out, "        }}")?;
            writeln!(out, "        memcpy(object->{}, *buf, 4);", name)?;
            writeln!(out, "        object->{}[4] = '\\0';", name)?;
            writeln!(out, "        *buf += 4;")?;
            writeln!(out, "        *len -= 4;")?;
        }
        FieldKind::ByteArray { len } => {
            emit_prefix_length(out, object, len)?;
            let lf = &len.field;
            writeln!(out, "        if (object->{} > 0) {{", lf)?;
            writeln!(out, "            if (*len < object->{}) {{", lf)?;
            writeln!(out, "                /* Not enough data. */")?;
            writeln!(out, "                goto error;")?;
            writeln!(out, "            }}")?;
            writeln!(out, "            object->{} = SCCalloc(1, object->{});", name, lf)?;
            writeln!(out, "            if (unlikely(object->{} == NULL)) {{", name)?;
            writeln!(out, "                goto error;")?;
            writeln!(out, "            }}")?;
            writeln!(out, "            memcpy(object->{}, *buf, object->{});", name, lf)?;
            writeln!(out, "            *buf += object->{};", lf)?;
            writeln!(out, "            *len -= object->{};", lf)?;
            writeln!(out, "        }}")?;
        }
        FieldKind::CharArray { len, .. } => {
            emit_prefix_length(out, object, len)?;
            let lf = &len.field;
            writeln!(out, "        if (object->{} >= sizeof(object->{})) {{", lf, name)?;
            writeln!(out, "            goto error;")?;
            writeln!(out, "        }}")?;
            writeln!(out, "        if (object->{} > 0) {{", lf)?;
            writeln!(out, "            if (*len < object->{}) {{", lf)?;
            writeln!(out, "                /* Not enough data. */")?;
            writeln!(out, "                goto error;")?;
            writeln!(out, "            }}")?;
            writeln!(out, "            memcpy(object->{}, *buf, object->{});", name, lf)?;
            writeln!(out, "            *buf += object->{};", lf)?;
            writeln!(out, "            *len -= object->{};", lf)?;
            writeln!(out, "        }}")?;
            writeln!(out, "        object->{}[object->{}] = '\\0';", name, lf)?;
        }
        FieldKind::Bstr8(subs) => {
            writeln!(out, "        {{")?;
            writeln!(out, "            uint8_t octet;")?;
            writeln!(out, "            if (!DNP3ReadUint8(buf, len, &octet)) {{")?;
            writeln!(out, "                goto error;")?;
            writeln!(out, "            }}")?;
            let mut shift = 0;
            for sub in subs {
                writeln!(
                    out,
                    "            object->{} = (octet >> {}) & {:#x};",
                    sub.name,
                    shift,
                    sub.mask()
                )?;
                shift += sub.width;
            }
            writeln!(out, "        }}")?;
        }
    }
    Ok(())
}

/// Length from the record's size prefix: `prefix - (offset - *len)`, rejected on underflow or
/// when it does not fit the length field.
fn emit_prefix_length(
    out: &mut String,
    object: &ObjectDefinition,
    len: &LengthSpec,
) -> Result<(), EmitError> {
    if !len.from_prefix {
        return Ok(());
    }
    let bound = object.int_type_of(&len.field).and_then(c_max);
    writeln!(out, "        {{")?;
    writeln!(out, "            uint32_t consumed = offset - *len;")?;
    match bound {
        Some(max) => writeln!(
            out,
            "            if (consumed > prefix || prefix - consumed > {}) {{",
            max
        )?,
        None => writeln!(out, "            if (consumed > prefix) {{")?,
    }
    writeln!(out, "                goto error;")?;
    writeln!(out, "            }}")?;
    writeln!(out, "            object->{} = prefix - consumed;", len.field)?;
    writeln!(out, "        }}")?;
    Ok(())
}

/// Reader routine and pointer cast for an integer field.
fn int_reader(t: IntType) -> (&'static str, &'static str) {
    match t {
        IntType::U8 => ("DNP3ReadUint8", ""),
        IntType::U16 => ("DNP3ReadUint16", ""),
        IntType::U24 => ("DNP3ReadUint24", ""),
        IntType::U32 => ("DNP3ReadUint32", ""),
        IntType::U64 => ("DNP3ReadUint64", ""),
        IntType::I8 => ("DNP3ReadUint8", "(uint8_t *)"),
        IntType::I16 => ("DNP3ReadUint16", "(uint16_t *)"),
        IntType::I24 => ("DNP3ReadUint24", "(uint32_t *)"),
        IntType::I32 => ("DNP3ReadUint32", "(uint32_t *)"),
        IntType::I64 => ("DNP3ReadUint64", "(uint64_t *)"),
    }
}

/// Upper bound check needed when the storage is narrower than the 32-bit prefix.
fn c_max(t: IntType) -> Option<&'static str> {
    match t {
        IntType::U8 => Some("UINT8_MAX"),
        IntType::U16 => Some("UINT16_MAX"),
        IntType::I8 => Some("INT8_MAX"),
        IntType::I16 => Some("INT16_MAX"),
        IntType::I24 | IntType::I32 => Some("INT32_MAX"),
        IntType::U24 | IntType::U32 | IntType::U64 | IntType::I64 => None,
    }
}

