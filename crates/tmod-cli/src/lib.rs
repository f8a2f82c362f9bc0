//! TMOD command-line library
//!
//! Argument types and command handlers for the `tmod` binary.

pub mod commands;

pub use crate::commands::{
    extract::handle as handle_extract, info::handle as handle_info, list::handle as handle_list,
};

use clap::Args;
use serde_json::Value;
use std::path::PathBuf;
use tmod_formats::DEFAULT_BUFFER_SIZE;

/// Output format for command results
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    Text,
    /// JSON output
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

impl OutputFormat {
    /// Serialize `value` according to the JSON variants
    pub fn render_json(self, value: &Value) -> serde_json::Result<String> {
        if self == Self::JsonPretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct InfoArgs {
    /// Container file
    pub file: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Container file
    pub file: PathBuf,

    /// Show archive index, offset, size and hash for every entry
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Container file
    pub file: PathBuf,

    /// Destination directory
    pub destination: PathBuf,

    /// Bytes read from the container per window
    #[arg(
        short,
        long,
        env = "TMOD_BUFFER_SIZE",
        default_value_t = DEFAULT_BUFFER_SIZE,
        value_parser = parse_buffer_size
    )]
    pub buffer_size: usize,

    /// Only extract entries whose path contains this text (repeatable)
    #[arg(short, long = "filter", value_name = "SUBSTR")]
    pub filters: Vec<String>,
}

fn parse_buffer_size(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("buffer size must be at least 1 byte".to_string()),
        Ok(size) => Ok(size),
        Err(e) => Err(format!("invalid buffer size '{value}': {e}")),
    }
}

/// Whether `path` is selected by `filters`; no filters selects everything
pub fn matches_filters(path: &str, filters: &[String]) -> bool {
    filters.is_empty() || filters.iter().any(|f| path.contains(f.as_str()))
}
