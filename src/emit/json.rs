//! JSON serializer: `OutputJsonDNP3SetItem` adds a point's fields to a jansson object.
//!
//! Byte arrays are base64-encoded. Text goes through a NUL-terminated temporary of exactly its
//! runtime length, so no length-aware string constructor is needed. Unknown objects fall through
//! to a debug log.

use super::{case_label, file_preamble, EmitError};
use crate::schema::{FieldKind, Schema};
use std::fmt::Write;

pub fn emit(schema: &Schema) -> Result<String, EmitError> {
    let mut out = file_preamble();
    writeln!(out)?;
    writeln!(out, "#include \"suricata-common.h\"")?;
    writeln!(out)?;
    writeln!(out, "#include \"util-crypt.h\"")?;
    writeln!(out)?;
    writeln!(out, "#include \"app-layer-dnp3.h\"")?;
    writeln!(out, "#include \"app-layer-dnp3-objects.h\"")?;
    writeln!(out)?;
    writeln!(out, "void OutputJsonDNP3SetItem(json_t *js, DNP3Object *object,")?;
    writeln!(out, "    DNP3Point *point)")?;
    writeln!(out, "{{")?;
    writeln!(out)?;
    writeln!(out, "    switch (DNP3_OBJECT_CODE(object->group, object->variation)) {{")?;
    for object in schema.objects() {
        writeln!(out, "        case {}: {{", case_label(object.key))?;
        writeln!(
            out,
            "            {} *data = point->data;",
            object.key.type_name()
        )?;
        for field in &object.fields {
            let name = &field.name;
            match &field.kind {
                FieldKind::Bstr8(subs) => {
                    for sub in subs {
                        set_integer(&mut out, &sub.name)?;
                    }
                }
                kind if kind.is_integer() => set_integer(&mut out, name)?,
                FieldKind::Flt32 | FieldKind::Flt64 => {
                    writeln!(out, "            json_object_set_new(js, \"{}\",", name)?;
                    writeln!(out, "                json_real(data->{}));", name)?;
                }
                FieldKind::ByteArray { len } => {
                    let lf = &len.field;
                    writeln!(
                        out,
                        "            unsigned long {name}_b64_len = ((data->{lf} + 2) / 3) * 4 + 1;"
                    )?;
                    writeln!(out, "            uint8_t {name}_b64[{name}_b64_len];")?;
                    writeln!(out, "            Base64Encode(data->{name}, data->{lf},")?;
                    writeln!(out, "                {name}_b64, &{name}_b64_len);")?;
                    writeln!(out, "            json_object_set_new(js, \"{name}\",")?;
                    writeln!(out, "                json_string((char *){name}_b64));")?;
                }
                FieldKind::Vstr4 => {
                    writeln!(
                        out,
                        "            json_object_set_new(js, \"{name}\", json_string(data->{name}));"
                    )?;
                }
                FieldKind::CharArray { len, .. } => {
                    let lf = &len.field;
                    writeln!(out, "            if (data->{lf} > 0) {{")?;
                    writeln!(out, "                char tmpbuf[data->{lf} + 1];")?;
                    writeln!(out, "                memcpy(tmpbuf, data->{name}, data->{lf});")?;
                    writeln!(out, "                tmpbuf[data->{lf}] = '\\0';")?;
                    writeln!(
                        out,
                        "                json_object_set_new(js, \"{name}\", json_string(tmpbuf));"
                    )?;
                    writeln!(out, "            }} else {{")?;
                    writeln!(
                        out,
                        "                json_object_set_new(js, \"{name}\", json_string(\"\"));"
                    )?;
                    writeln!(out, "            }}")?;
                }
                // Covered by the guard arm above.
                FieldKind::Int(_) | FieldKind::Timestamp => {}
            }
        }
        writeln!(out, "            break;")?;
        writeln!(out, "        }}")?;
    }
    writeln!(out, "        default:")?;
    writeln!(out, "            SCLogDebug(\"Unknown object: %d:%d\", object->group,")?;
    writeln!(out, "                object->variation);")?;
    writeln!(out, "            break;")?;
    writeln!(out, "    }}")?;
    writeln!(out)?;
    writeln!(out, "}}")?;
    Ok(out)
}

fn set_integer(out: &mut String, name: &str) -> Result<(), EmitError> {
    writeln!(out, "            json_object_set_new(js, \"{}\",", name)?;
    writeln!(out, "                json_integer(data->{}));", name)?;
    Ok(())
}
