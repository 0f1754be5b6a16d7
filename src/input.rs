//! # Input Source
//!
//! Loads the newline-delimited list of URLs to inspect. Every non-blank line
//! becomes a [`WorkItem`] carrying its text verbatim, including any `\r` left
//! behind by Windows line endings. Normalization happens later, when a value
//! is about to be typed, stored or logged.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, instrument};

/// Error type for loading the work list
#[derive(Debug, Error)]
pub enum InputError {
    /// The input resource could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that was requested
        path: PathBuf,
        /// Underlying IO failure
        #[source]
        source: io::Error,
    },
}

/// One URL to inspect, as read from the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    index: usize,
    raw_value: String,
}

impl WorkItem {
    /// Create a work item from its 0-based line position and raw text
    pub fn new(index: usize, raw_value: impl Into<String>) -> Self {
        Self {
            index,
            raw_value: raw_value.into(),
        }
    }

    /// 0-based line position in the input, for logging
    pub fn index(&self) -> usize {
        self.index
    }

    /// The line exactly as read
    pub fn raw_value(&self) -> &str {
        &self.raw_value
    }

    /// The value with carriage returns removed and surrounding whitespace trimmed
    pub fn normalized(&self) -> String {
        crate::record::strip_carriage_returns(&self.raw_value)
            .trim()
            .to_string()
    }
}

/// Split input text into work items.
///
/// Lines are split on `\n` only, so a trailing `\r` stays part of the raw
/// value. Lines that are blank once `\r` and whitespace are removed produce no
/// item, but still advance the index.
pub fn parse(contents: &str) -> Vec<WorkItem> {
    contents
        .split('\n')
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| WorkItem::new(index, line))
        .collect()
}

/// Load work items from a file
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn load(path: impl AsRef<Path>) -> Result<Vec<WorkItem>, InputError> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| InputError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let items = parse(&contents);
    info!(count = items.len(), "Loaded work items");
    Ok(items)
}
