//! C source emitters for the downstream DNP3 engine.
//!
//! Each backend is a pure function of the validated [`Schema`] and its [`LayoutPlan`], with one
//! match arm per [`FieldKind`](crate::schema::FieldKind). Output is plain text; where it goes is
//! the [integrator](crate::integrate)'s business.
//!
//! | artifact | module | placement |
//! |----------|--------|-----------|
//! | storage structs | [`structs`] | marked region of the objects header |
//! | decoders, release routine, dispatch | [`decoder`], [`free`] | marked region of the objects source |
//! | scripting binding | [`lua`] | whole file |
//! | JSON serializer | [`json`] | whole file |

pub mod decoder;
pub mod free;
pub mod json;
pub mod lua;
pub mod structs;

use crate::layout::LayoutPlan;
use crate::schema::{ObjectKey, Schema};

#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("unknown datatype '{ty}' for extra field '{field}' of object {object}")]
    UnsupportedExtraType {
        object: ObjectKey,
        field: String,
        ty: &'static str,
    },
    #[error("object {object}: no layout plan")]
    MissingPlan { object: ObjectKey },
    #[error("format: {0}")]
    Fmt(#[from] std::fmt::Error),
}

/// Rendered text for every generated target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub structs: String,
    pub objects_source: String,
    pub lua: String,
    pub json: String,
}

/// Render all four artifacts. Nothing is returned unless every backend succeeds.
pub fn emit_all(schema: &Schema, plan: &LayoutPlan) -> Result<Artifacts, EmitError> {
    let structs = structs::emit(schema)?;
    let mut objects_source = decoder::emit_routines(schema, plan)?;
    objects_source.push_str(&free::emit(schema, plan)?);
    objects_source.push_str(&decoder::emit_dispatch(schema)?);
    let lua = lua::emit(schema)?;
    let json = json::emit(schema)?;
    tracing::info!(
        "Emitted {} objects ({} skipped as unimplemented).",
        schema.len(),
        schema.unimplemented().len()
    );
    Ok(Artifacts {
        structs,
        objects_source,
        lua,
        json,
    })
}

/// `DNP3_OBJECT_CODE(g, v)` case label.
pub(crate) fn case_label(key: ObjectKey) -> String {
    format!("DNP3_OBJECT_CODE({}, {})", key.group, key.variation)
}

/// License block opening every whole-file target.
pub const LICENSE_HEADER: &str = "/* Copyright (C) 2015 Open Information Security Foundation
 *
 * You can copy, redistribute or modify this Program under the terms of
 * the GNU General Public License version 2 as published by the Free
 * Software Foundation.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * version 2 along with this program; if not, write to the Free Software
 * Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA
 * 02110-1301, USA.
 */
";

pub(crate) const GENERATED_BANNER: &str = "/**\n * DO NOT EDIT. THIS FILE IS AUTO-GENERATED.\n */\n";

/// License header, blank line, then the generated-file banner.
pub(crate) fn file_preamble() -> String {
    format!("{}\n{}", LICENSE_HEADER, GENERATED_BANNER)
}
