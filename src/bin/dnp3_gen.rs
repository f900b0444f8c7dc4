//! Regenerate the DNP3 object code of a source tree from its object schema.
//!
//! # Usage
//!
//! ```bash
//! # Write every target under the current tree
//! dnp3_gen
//!
//! # Verify the checked-in files are current (exit status 1 if not)
//! dnp3_gen --root ../suricata --check
//!
//! # Print the rendered JSON serializer instead of writing
//! dnp3_gen --stdout json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use dnp3_objgen::generate::{self, GenConfig, Mode, Target};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Artifact {
    ObjectsHeader,
    ObjectsSource,
    Lua,
    Json,
}

impl From<Artifact> for Target {
    fn from(a: Artifact) -> Target {
        match a {
            Artifact::ObjectsHeader => Target::ObjectsHeader,
            Artifact::ObjectsSource => Target::ObjectsSource,
            Artifact::Lua => Target::LuaSource,
            Artifact::Json => Target::JsonSource,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "dnp3_gen")]
#[command(about = "Generate DNP3 object decoders, structs and serializers", long_about = None)]
struct Args {
    /// Source tree root; relative paths below are resolved against it
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Object schema (YAML)
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// Struct header target
    #[arg(long)]
    objects_header: Option<PathBuf>,

    /// Decoder source target
    #[arg(long)]
    objects_source: Option<PathBuf>,

    /// Scripting binding target
    #[arg(long)]
    lua_source: Option<PathBuf>,

    /// JSON serializer target
    #[arg(long)]
    json_source: Option<PathBuf>,

    /// Render and compare only; exit with status 1 if any target would change
    #[arg(long)]
    check: bool,

    /// Print one rendered target to stdout instead of writing
    #[arg(long, value_enum)]
    stdout: Option<Artifact>,

    /// Print the generation report as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn config(&self) -> GenConfig {
        let mut config = GenConfig {
            root: self.root.clone(),
            ..GenConfig::default()
        };
        let overrides = [
            (&self.schema, &mut config.schema),
            (&self.objects_header, &mut config.objects_header),
            (&self.objects_source, &mut config.objects_source),
            (&self.lua_source, &mut config.lua_source),
            (&self.json_source, &mut config.json_source),
        ];
        for (arg, slot) in overrides {
            if let Some(path) = arg {
                *slot = path.clone();
            }
        }
        config
    }
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.config();

    if let Some(artifact) = args.stdout {
        let wanted = Target::from(artifact);
        let (_, rendered) = generate::render(&config)?;
        let target = rendered
            .into_iter()
            .find(|r| r.target == wanted)
            .context("target not rendered")?;
        print!("{}", target.contents);
        return Ok(ExitCode::SUCCESS);
    }

    let mode = if args.check { Mode::Check } else { Mode::Write };
    let report = generate::run(&config, mode)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Objects: {}", report.objects);
        for skipped in &report.skipped {
            println!("  skipped {}", skipped);
        }
        let verb = if args.check { "stale" } else { "updated" };
        for path in &report.updated {
            println!("  {} {}", verb, path.display());
        }
        for path in &report.unchanged {
            println!("  unchanged {}", path.display());
        }
    }

    if args.check && !report.is_up_to_date() {
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}
