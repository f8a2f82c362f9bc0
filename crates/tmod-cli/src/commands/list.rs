use anyhow::Result;
use serde_json::json;
use std::fmt::Write as _;
use tmod_formats::TmodContainer;

use crate::{ListArgs, OutputFormat, commands::open_container};

pub fn handle(args: ListArgs, format: OutputFormat) -> Result<()> {
    let container = open_container(&args.file)?;
    let output = render(&container, args.verbose, format)?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

pub fn render(container: &TmodContainer, verbose: bool, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json | OutputFormat::JsonPretty => {
            let value = if verbose {
                json!(container.entries)
            } else {
                json!(container.entries.iter().map(|e| &e.path).collect::<Vec<_>>())
            };
            Ok(format.render_json(&value)?)
        }
        OutputFormat::Text => {
            let mut out = String::new();
            if verbose && !container.entries.is_empty() {
                writeln!(
                    out,
                    "{:>7} {:>10} {:>10} {:>8}  path",
                    "archive", "offset", "size", "hash"
                )?;
            }
            for entry in &container.entries {
                if verbose {
                    writeln!(
                        out,
                        "{:>7} {:>10} {:>10} {:08x}  {}",
                        entry.archive_index, entry.byte_offset, entry.size, entry.hash, entry.path
                    )?;
                } else {
                    writeln!(out, "{}", entry.path)?;
                }
            }
            Ok(out.trim_end().to_string())
        }
    }
}
