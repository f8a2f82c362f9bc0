use anyhow::{Context, Result};
use serde_json::json;
use std::fs::File;
use std::io::BufReader;
use tmod_formats::{
    EntryFailure, ExtractOptions, ExtractionReport, Extractor, IndexEntry, NoiseMarkers,
    TmodContainer,
};
use tracing::info;

use crate::{ExtractArgs, OutputFormat, matches_filters};

pub fn handle(args: ExtractArgs, format: OutputFormat) -> Result<()> {
    let report = run(&args)?;

    match format {
        OutputFormat::Json | OutputFormat::JsonPretty => {
            println!("{}", format.render_json(&summary(&report))?);
        }
        OutputFormat::Text => {
            println!(
                "Extracted {} of {} entries to {} ({} bytes, {} markers removed)",
                report.extracted.len(),
                report.total,
                args.destination.display(),
                report.bytes_written,
                report.markers_removed()
            );
            for skipped in &report.skipped {
                println!("  skipped {}: {}", skipped.path, skipped.error);
            }
            for failed in &report.failed {
                println!("  failed  {}: {}", failed.path, failed.error);
            }
        }
    }

    report
        .into_result()
        .with_context(|| format!("extraction from {} incomplete", args.file.display()))?;
    Ok(())
}

/// Extract the selected entries without turning failures into an error
pub fn run(args: &ExtractArgs) -> Result<ExtractionReport> {
    let file = File::open(&args.file)
        .with_context(|| format!("failed to open {}", args.file.display()))?;
    let mut source = BufReader::new(file);
    let container = TmodContainer::parse(&mut source)
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let entries: Vec<IndexEntry> = container
        .entries_by_offset()
        .into_iter()
        .filter(|entry| matches_filters(&entry.path, &args.filters))
        .collect();

    info!(
        "Extracting {} of {} entries from {}",
        entries.len(),
        container.entries.len(),
        args.file.display()
    );

    let markers = NoiseMarkers::standard()?;
    let extractor = Extractor::new(
        &markers,
        ExtractOptions::default().with_buffer_size(args.buffer_size),
    );

    let mut last_step = 0;
    let report = extractor.extract(
        &mut source,
        container.header.header_size,
        &entries,
        &args.destination,
        |fraction| {
            let percent = (fraction * 100.0) as u32;
            if percent / 10 > last_step {
                last_step = percent / 10;
                info!("{percent}% complete");
            }
        },
    )?;

    Ok(report)
}

fn summary(report: &ExtractionReport) -> serde_json::Value {
    let failures = |list: &[EntryFailure]| {
        list.iter()
            .map(|f| json!({ "path": f.path, "error": f.error.to_string() }))
            .collect::<Vec<_>>()
    };

    json!({
        "total": report.total,
        "extracted": report.extracted,
        "skipped": failures(&report.skipped),
        "failed": failures(&report.failed),
        "bytes_written": report.bytes_written,
        "markers_removed": report.markers_removed(),
        "cancelled": report.cancelled,
    })
}
