use std::env;
use std::error::Error;
use std::path::Path;
use std::process::Command;

use feed_schema::{Schema, SchemaFile};

const DEFAULT_SCHEMA_GLOB: &str = "feed_schema/src/data/*.json";

fn main() -> Result<(), Box<dyn Error>> {
    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("check-schema") => {
            let patterns: Vec<String> = args.collect();
            check_schema(&patterns)
        }
        Some("bench-encode") => bench_encode(),
        Some("help") | None => {
            print_usage();
            Ok(())
        }
        Some(cmd) => {
            eprintln!("Unknown xtask '{cmd}'.");
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!("Usage: cargo xtask check-schema [GLOB...]");
    eprintln!("       cargo xtask bench-encode");
    eprintln!("       cargo xtask help");
}

/// Load every matching schema file the way the server does at startup and
/// report the ones it would refuse.
fn check_schema(patterns: &[String]) -> Result<(), Box<dyn Error>> {
    let patterns = if patterns.is_empty() {
        vec![DEFAULT_SCHEMA_GLOB.to_string()]
    } else {
        patterns.to_vec()
    };

    let mut checked = 0;
    let mut failed = 0;
    for pattern in &patterns {
        for entry in glob::glob(pattern)? {
            let path = entry?;
            checked += 1;
            match load(&path) {
                Ok(schema) => println!(
                    "ok    {} ({} streams, {} indicators)",
                    path.display(),
                    schema.streams.len(),
                    schema.indicators.len()
                ),
                Err(err) => {
                    failed += 1;
                    println!("error {}: {}", path.display(), err);
                }
            }
        }
    }

    if checked == 0 {
        return Err(format!("no schema files matched {}", patterns.join(", ")).into());
    }
    if failed > 0 {
        return Err(format!("{failed} of {checked} schema files failed to load").into());
    }
    Ok(())
}

fn load(path: &Path) -> Result<Schema, Box<dyn Error>> {
    let file = SchemaFile::from_file(path)?;
    Ok(Schema::load(file)?)
}

fn bench_encode() -> Result<(), Box<dyn Error>> {
    let status = Command::new("cargo")
        .args(["bench", "-p", "feed_server", "--bench", "encode_bench"])
        .status()?;

    if !status.success() {
        return Err("encode benchmark failed".into());
    }
    Ok(())
}
