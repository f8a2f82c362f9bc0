use anyhow::Result;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tmod_formats::TmodContainer;

use crate::{InfoArgs, OutputFormat, commands::open_container};

pub fn handle(args: InfoArgs, format: OutputFormat) -> Result<()> {
    let container = open_container(&args.file)?;
    println!("{}", render(&container, format)?);
    Ok(())
}

pub fn render(container: &TmodContainer, format: OutputFormat) -> Result<String> {
    let properties: BTreeMap<_, _> = container.properties.iter().collect();

    match format {
        OutputFormat::Json | OutputFormat::JsonPretty => {
            let value = json!({
                "header": container.header,
                "payload_start": container.header.payload_start(),
                "properties": properties,
                "entry_count": container.entries.len(),
                "payload_size": container.total_payload_size(),
            });
            Ok(format.render_json(&value)?)
        }
        OutputFormat::Text => {
            let header = &container.header;
            let mut out = String::new();
            writeln!(out, "Header size:    {}", header.header_size)?;
            writeln!(out, "Format version: {}", header.format_version)?;
            writeln!(out, "Payload start:  {}", header.payload_start())?;
            writeln!(
                out,
                "Entries:        {} ({} bytes)",
                container.entries.len(),
                container.total_payload_size()
            )?;

            if !properties.is_empty() {
                writeln!(out, "Properties:")?;
                let width = properties.keys().map(|k| k.len()).max().unwrap_or(0);
                for (key, value) in &properties {
                    writeln!(out, "  {key:<width$}  {value}")?;
                }
            }

            Ok(out.trim_end().to_string())
        }
    }
}
