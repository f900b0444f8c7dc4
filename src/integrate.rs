//! Place generated text into target files.
//!
//! Region targets keep everything outside the start/end markers untouched. Files are replaced
//! by writing a temporary in the same directory and renaming it over the target.

use std::io::Write;
use std::path::Path;

pub const START_MARKER: &str = "/* START GENERATED CODE */";
pub const END_MARKER: &str = "/* END GENERATED CODE */";

#[derive(Debug, thiserror::Error)]
pub enum IntegrateError {
    #[error("missing marker '{0}'")]
    MissingMarker(&'static str),
    #[error("end marker precedes start marker")]
    EndBeforeStart,
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

/// Replace the text between the first start marker and the following end marker.
pub fn splice_region(content: &str, generated: &str) -> Result<String, IntegrateError> {
    let start = content
        .find(START_MARKER)
        .ok_or(IntegrateError::MissingMarker(START_MARKER))?;
    let body = start + START_MARKER.len();
    let end = match content[body..].find(END_MARKER) {
        Some(i) => body + i,
        None if content.contains(END_MARKER) => return Err(IntegrateError::EndBeforeStart),
        None => return Err(IntegrateError::MissingMarker(END_MARKER)),
    };
    let mut out = String::with_capacity(content.len() + generated.len());
    out.push_str(&content[..body]);
    out.push_str(generated);
    out.push_str(&content[end..]);
    Ok(out)
}

/// Write `contents` to `path` through a temporary file and a rename.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), IntegrateError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| IntegrateError::Io(e.error))?;
    Ok(())
}
