//! Command handlers

pub mod extract;
pub mod info;
pub mod list;

use anyhow::{Context, Result};
use std::path::Path;
use tmod_formats::TmodContainer;

/// Parse the container at `path`, naming the file on failure
pub(crate) fn open_container(path: &Path) -> Result<TmodContainer> {
    TmodContainer::open(path).with_context(|| format!("failed to read {}", path.display()))
}
