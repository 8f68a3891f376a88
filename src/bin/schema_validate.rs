//! Validate JSON documents against the built-in pairing shapes.
//!
//! Usage:
//!   schema-validate --shape envelope --file message.json
//!   schema-validate --shape verify-body < body.json
//!   schema-validate --shape pending-registration --print

use anyhow::{Context, Result, bail};
use clap::Parser;
use devpair::{SchemaSet, Shape};
use serde_json::Value;
use std::fs::File;
use std::io::{Read, stdin};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "schema-validate")]
#[command(about = "Validate JSON against the pairing message and document shapes")]
struct Cli {
    /// Shape to validate against.
    #[arg(long, value_parser = [
        "envelope",
        "catalog-entry",
        "register-body",
        "verify-body",
        "pending-registration",
    ])]
    shape: String,
    /// Optional input file; reads stdin when omitted.
    #[arg(long)]
    file: Option<PathBuf>,
    /// Print the shape's JSON Schema instead of validating.
    #[arg(long, conflicts_with = "file")]
    print: bool,
}

fn read_input(file: Option<PathBuf>) -> Result<Value> {
    let mut buf = String::new();
    if let Some(path) = file {
        File::open(&path)
            .with_context(|| format!("opening input file {}", path.display()))?
            .read_to_string(&mut buf)
            .with_context(|| format!("reading input file {}", path.display()))?;
    } else {
        stdin()
            .read_to_string(&mut buf)
            .context("reading stdin for input JSON")?;
    }
    let value: Value = serde_json::from_str(&buf).context("parsing input JSON")?;
    Ok(value)
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let Some(shape) = Shape::from_name(&cli.shape) else {
        bail!("unknown shape '{}'", cli.shape);
    };

    if cli.print {
        println!("{}", serde_json::to_string_pretty(&shape.definition())?);
        return Ok(());
    }

    let input = read_input(cli.file)?;
    let schemas = SchemaSet::compile()?;
    let verdict = schemas.validate(shape, &input);
    if !verdict.is_valid() {
        let details = verdict
            .errors()
            .iter()
            .map(|err| {
                let at = if err.instance_path.is_empty() {
                    "/"
                } else {
                    err.instance_path.as_str()
                };
                format!("{at}: {}", err.message)
            })
            .collect::<Vec<_>>()
            .join("\n");
        bail!("{} failed schema validation:\n{}", shape.name(), details);
    }
    println!("{}: ok", shape.name());
    Ok(())
}
