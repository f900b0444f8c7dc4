//! One generation run: load → validate → plan → emit → integrate.
//!
//! Every target is rendered and spliced in memory first; files are only written once all of
//! them succeeded, so a failing run leaves the tree as it was.

use crate::emit::{self, Artifacts, EmitError};
use crate::integrate::{self, IntegrateError};
use crate::layout::LayoutPlan;
use crate::loader::{self, SchemaError};
use crate::schema::Schema;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum GenError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Emit(#[from] EmitError),
    #[error("{}: {source}", .path.display())]
    Integrate {
        path: PathBuf,
        source: IntegrateError,
    },
}

/// Paths of the schema and targets, relative to `root` unless absolute.
#[derive(Debug, Clone)]
pub struct GenConfig {
    pub root: PathBuf,
    pub schema: PathBuf,
    pub objects_header: PathBuf,
    pub objects_source: PathBuf,
    pub lua_source: PathBuf,
    pub json_source: PathBuf,
}

impl Default for GenConfig {
    fn default() -> Self {
        GenConfig {
            root: PathBuf::from("."),
            schema: PathBuf::from("scripts/dnp3-gen/dnp3-objects.yaml"),
            objects_header: PathBuf::from("src/app-layer-dnp3-objects.h"),
            objects_source: PathBuf::from("src/app-layer-dnp3-objects.c"),
            lua_source: PathBuf::from("src/util-lua-dnp3-objects.c"),
            json_source: PathBuf::from("src/output-json-dnp3-objects.c"),
        }
    }
}

impl GenConfig {
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    ObjectsHeader,
    ObjectsSource,
    LuaSource,
    JsonSource,
}

impl Target {
    pub const ALL: [Target; 4] = [
        Target::ObjectsHeader,
        Target::ObjectsSource,
        Target::LuaSource,
        Target::JsonSource,
    ];

    /// Region targets are spliced between markers; the others are written whole.
    pub fn is_region(&self) -> bool {
        matches!(self, Target::ObjectsHeader | Target::ObjectsSource)
    }

    pub fn path<'c>(&self, config: &'c GenConfig) -> &'c Path {
        match self {
            Target::ObjectsHeader => &config.objects_header,
            Target::ObjectsSource => &config.objects_source,
            Target::LuaSource => &config.lua_source,
            Target::JsonSource => &config.json_source,
        }
    }

    fn artifact<'a>(&self, artifacts: &'a Artifacts) -> &'a str {
        match self {
            Target::ObjectsHeader => &artifacts.structs,
            Target::ObjectsSource => &artifacts.objects_source,
            Target::LuaSource => &artifacts.lua,
            Target::JsonSource => &artifacts.json,
        }
    }
}

/// Final contents of one target file.
#[derive(Debug, Clone)]
pub struct RenderedTarget {
    pub target: Target,
    pub path: PathBuf,
    pub contents: String,
    pub changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Write,
    /// Render and compare only.
    Check,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationReport {
    pub objects: usize,
    pub skipped: Vec<String>,
    pub updated: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
}

impl GenerationReport {
    pub fn is_up_to_date(&self) -> bool {
        self.updated.is_empty()
    }
}

/// Load, validate and emit from schema text, without touching the filesystem.
pub fn generate_from_str(source: &str) -> Result<(Schema, Artifacts), GenError> {
    let schema = loader::load_str(source)?;
    let plan = LayoutPlan::new(&schema);
    let artifacts = emit::emit_all(&schema, &plan)?;
    Ok((schema, artifacts))
}

/// Render every target against the files currently on disk.
pub fn render(config: &GenConfig) -> Result<(Schema, Vec<RenderedTarget>), GenError> {
    let schema_path = config.resolve(&config.schema);
    let source = read(&schema_path)?;
    let (schema, artifacts) = generate_from_str(&source)?;

    let mut rendered = Vec::with_capacity(Target::ALL.len());
    for target in Target::ALL {
        let path = config.resolve(target.path(config));
        let generated = target.artifact(&artifacts);
        let (contents, existing) = if target.is_region() {
            let existing = read(&path)?;
            let contents = integrate::splice_region(&existing, generated).map_err(|source| {
                GenError::Integrate {
                    path: path.clone(),
                    source,
                }
            })?;
            (contents, Some(existing))
        } else {
            (generated.to_string(), std::fs::read_to_string(&path).ok())
        };
        let changed = existing.as_deref() != Some(contents.as_str());
        rendered.push(RenderedTarget {
            target,
            path,
            contents,
            changed,
        });
    }
    Ok((schema, rendered))
}

/// Run generation. In [`Mode::Check`] nothing is written and `updated` lists stale targets.
pub fn run(config: &GenConfig, mode: Mode) -> Result<GenerationReport, GenError> {
    let (schema, rendered) = render(config)?;
    let mut report = GenerationReport {
        objects: schema.len(),
        skipped: schema
            .unimplemented()
            .iter()
            .map(|u| format!("{}: {}", u.key, u.reason))
            .collect(),
        ..Default::default()
    };
    for target in rendered {
        if !target.changed {
            report.unchanged.push(target.path);
            continue;
        }
        if mode == Mode::Write {
            integrate::write_atomic(&target.path, &target.contents).map_err(|source| {
                GenError::Integrate {
                    path: target.path.clone(),
                    source,
                }
            })?;
            tracing::info!("Updated {}.", target.path.display());
        } else {
            tracing::info!("Out of date: {}.", target.path.display());
        }
        report.updated.push(target.path);
    }
    Ok(report)
}

fn read(path: &Path) -> Result<String, GenError> {
    std::fs::read_to_string(path).map_err(|source| GenError::Io {
        path: path.to_path_buf(),
        source,
    })
}
