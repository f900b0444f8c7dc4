//! Decode one object's points from a hex payload and print them as JSON.
//!
//! ```bash
//! dnp3_decode --group 30 --variation 5 --count 1 0100004842
//! dnp3_decode --group 120 --variation 1 --prefix-code 5 --count 1 0c00...
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use dnp3_objgen::codec::{Decoder, Signal};
use dnp3_objgen::loader;
use dnp3_objgen::serialize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "dnp3_decode")]
#[command(about = "Decode DNP3 object points from a hex payload", long_about = None)]
struct Args {
    /// Object schema (YAML)
    #[arg(short, long, default_value = "schema/dnp3-objects.yaml")]
    schema: PathBuf,

    #[arg(short, long)]
    group: u8,

    #[arg(short, long)]
    variation: u8,

    /// Prefix code from the object header qualifier
    #[arg(short, long, default_value_t = 0, value_parser = parse_u8)]
    prefix_code: u8,

    /// Index of the first point
    #[arg(long, default_value_t = 0)]
    start: u32,

    /// Number of points
    #[arg(short = 'n', long, default_value_t = 1)]
    count: u32,

    /// Payload bytes as hex (whitespace allowed)
    payload: String,
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| e.to_string())
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
    let source = std::fs::read_to_string(&args.schema)
        .with_context(|| format!("reading {}", args.schema.display()))?;
    let schema = loader::load_str(&source)?;

    let compact: String = args.payload.split_whitespace().collect();
    let bytes = hex::decode(&compact).context("payload is not valid hex")?;

    let decoder = Decoder::new(&schema);
    let mut buf = &bytes[..];
    let mut points = Vec::new();
    let signal = decoder.decode_object(
        args.group,
        args.variation,
        &mut buf,
        args.prefix_code,
        args.start,
        args.count,
        &mut points,
    );

    let items: Vec<serde_json::Value> = points
        .iter()
        .map(|p| {
            let mut item = serde_json::Map::new();
            item.insert("index".into(), p.index.into());
            item.insert("prefix".into(), p.prefix.into());
            if let Some(data) = serialize::point_to_json(&schema, p) {
                item.insert("data".into(), data);
            }
            serde_json::Value::Object(item)
        })
        .collect();
    let out = serde_json::json!({
        "group": args.group,
        "variation": args.variation,
        "signal": format!("{:?}", signal),
        "event": signal.event_code(),
        "consumed": bytes.len() - buf.len(),
        "remaining": buf.len(),
        "points": items,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);

    Ok(match signal {
        Signal::Ok => ExitCode::SUCCESS,
        _ => ExitCode::from(1),
    })
}
