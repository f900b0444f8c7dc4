//! Scripting binding: `DNP3PushPoint` pushes each field of a point as a key/value pair.
//!
//! Text and byte data are pushed with explicit lengths so embedded NULs survive.

use super::{case_label, file_preamble, EmitError};
use crate::schema::{FieldKind, Schema};
use std::fmt::Write;

pub fn emit(schema: &Schema) -> Result<String, EmitError> {
    let mut out = file_preamble();
    writeln!(out)?;
    writeln!(out, "#include \"suricata-common.h\"")?;
    writeln!(out)?;
    writeln!(out, "#include \"app-layer-dnp3.h\"")?;
    writeln!(out, "#include \"app-layer-dnp3-objects.h\"")?;
    writeln!(out)?;
    writeln!(out, "#ifdef HAVE_LUA")?;
    writeln!(out)?;
    writeln!(out, "#include <lua.h>")?;
    writeln!(out, "#include <lualib.h>")?;
    writeln!(out, "#include <lauxlib.h>")?;
    writeln!(out)?;
    writeln!(out, "#include \"util-lua.h\"")?;
    writeln!(out)?;
    writeln!(out, "/**")?;
    writeln!(out, " * \\brief Push an object point item onto the stack.")?;
    writeln!(out, " */")?;
    writeln!(out, "void DNP3PushPoint(lua_State *luastate, DNP3Object *object,")?;
    writeln!(out, "    DNP3Point *point)")?;
    writeln!(out, "{{")?;
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
                        push_pair(&mut out, &sub.name, &format!("lua_pushinteger(luastate, data->{});", sub.name))?;
                    }
                }
                kind if kind.is_integer() => {
                    push_pair(&mut out, name, &format!("lua_pushinteger(luastate, data->{});", name))?
                }
                FieldKind::Flt32 | FieldKind::Flt64 => {
                    push_pair(&mut out, name, &format!("lua_pushnumber(luastate, data->{});", name))?
                }
                FieldKind::Vstr4 => push_pair(
                    &mut out,
                    name,
                    &format!("LuaPushStringBuffer(luastate, (uint8_t *)data->{}, 4);", name),
                )?,
                FieldKind::CharArray { len, .. } => push_pair(
                    &mut out,
                    name,
                    &format!(
                        "LuaPushStringBuffer(luastate, (uint8_t *)data->{},\n                data->{});",
                        name, len.field
                    ),
                )?,
                FieldKind::ByteArray { len } => push_pair(
                    &mut out,
                    name,
                    &format!(
                        "lua_pushlstring(luastate, (const char *)data->{},\n                data->{});",
                        name, len.field
                    ),
                )?,
                // Covered by the guard arm above.
                FieldKind::Int(_) | FieldKind::Timestamp => {}
            }
        }
        writeln!(out, "            break;")?;
        writeln!(out, "        }}")?;
    }
    writeln!(out, "        default:")?;
    writeln!(out, "            break;")?;
    writeln!(out, "    }}")?;
    writeln!(out, "}}")?;
    writeln!(out)?;
    writeln!(out, "#endif /* HAVE_LUA */")?;
    Ok(out)
}

fn push_pair(out: &mut String, key: &str, push_value: &str) -> Result<(), EmitError> {
    writeln!(out, "            lua_pushliteral(luastate, \"{}\");", key)?;
    writeln!(out, "            {}", push_value)?;
    writeln!(out, "            lua_settable(luastate, -3);")?;
    Ok(())
}
