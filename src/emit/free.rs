//! `DNP3FreeObjectPoint`: frees owned buffers of objects that have them, then the point itself.

use super::{case_label, EmitError};
use crate::layout::LayoutPlan;
use crate::schema::Schema;
use std::fmt::Write;

pub fn emit(schema: &Schema, plan: &LayoutPlan) -> Result<String, EmitError> {
    let mut out = String::new();
    writeln!(out, "void DNP3FreeObjectPoint(int group, int variation, void *point)")?;
    writeln!(out, "{{")?;
    writeln!(out, "    switch(DNP3_OBJECT_CODE(group, variation)) {{")?;
    for object in schema.objects() {
        let object_plan = plan
            .get(object.key)
            .ok_or(EmitError::MissingPlan { object: object.key })?;
        if !object_plan.has_freeable_fields() {
            continue;
        }
        let ty = object.key.type_name();
        writeln!(out, "        case {}: {{", case_label(object.key))?;
        writeln!(out, "            {ty} *object = ({ty} *) point;")?;
        for name in &object_plan.freeable {
            writeln!(out, "            if (object->{} != NULL) {{", name)?;
            writeln!(out, "                SCFree(object->{});", name)?;
            writeln!(out, "            }}")?;
        }
        writeln!(out, "            break;")?;
        writeln!(out, "        }}")?;
    }
    writeln!(out, "        default:")?;
    writeln!(out, "            break;")?;
    writeln!(out, "    }}")?;
    writeln!(out, "    SCFree(point);")?;
    writeln!(out, "}}")?;
    writeln!(out)?;
    Ok(out)
}
