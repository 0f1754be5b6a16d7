//! # Result Sink
//!
//! Owns the growing result collection and rewrites both output files in full
//! after every append. The CSV header is the union of every field seen so far,
//! which can only be computed from the whole collection.
//!
//! Each file is written to a sibling temporary file and renamed into place, so
//! a process tailing the outputs never sees a half-written file.

use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, instrument, warn};

use crate::record::ExtractionResult;

/// Error type for result persistence
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing an output file failed
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV serialization failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Flushing the CSV buffer failed
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Results in completion order. Grows only through [`ResultSink::append`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultCollection {
    results: Vec<ExtractionResult>,
}

impl ResultCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtractionResult> {
        self.results.iter()
    }

    pub fn as_slice(&self) -> &[ExtractionResult] {
        &self.results
    }

    fn push(&mut self, result: ExtractionResult) {
        self.results.push(result);
    }

    /// Union of all field names, in first-seen order
    pub fn headers(&self) -> Vec<String> {
        let mut headers = IndexSet::new();
        for result in &self.results {
            for name in result.field_names() {
                if !headers.contains(name) {
                    headers.insert(name.to_string());
                }
            }
        }
        headers.into_iter().collect()
    }

    /// Pretty-printed JSON array
    pub fn to_json(&self) -> Result<String, SinkError> {
        Ok(serde_json::to_string_pretty(&self.results)?)
    }

    /// CSV with a header row; empty when there are no results
    pub fn to_csv(&self) -> Result<Vec<u8>, SinkError> {
        if self.results.is_empty() {
            return Ok(Vec::new());
        }

        let headers = self.headers();
        let mut writer = csv::Writer::from_writer(vec![]);
        writer.write_record(&headers)?;

        for result in &self.results {
            let row: Vec<String> = headers
                .iter()
                .map(|name| {
                    result
                        .get(name)
                        .map(|value| value.to_cell())
                        .unwrap_or_default()
                })
                .collect();
            writer.write_record(&row)?;
        }

        writer.into_inner().map_err(|e| SinkError::Io(e.into_error()))
    }
}

/// Accumulates results and persists them after every append
#[derive(Debug)]
pub struct ResultSink {
    collection: ResultCollection,
    json_path: PathBuf,
    csv_path: PathBuf,
}

impl ResultSink {
    pub fn new(json_path: impl Into<PathBuf>, csv_path: impl Into<PathBuf>) -> Self {
        Self {
            collection: ResultCollection::new(),
            json_path: json_path.into(),
            csv_path: csv_path.into(),
        }
    }

    /// Append a result, then rewrite both outputs.
    ///
    /// A write failure leaves the result in memory; the next successful
    /// write includes it.
    #[instrument(skip_all, fields(url = %result.url()))]
    pub async fn append(&mut self, result: ExtractionResult) -> Result<(), SinkError> {
        self.collection.push(result);
        self.persist().await
    }

    /// Rewrite both outputs from the whole collection
    pub async fn persist(&self) -> Result<(), SinkError> {
        let json = self.collection.to_json()?;
        write_atomic(&self.json_path, json.as_bytes()).await?;

        let csv = self.collection.to_csv()?;
        write_atomic(&self.csv_path, &csv).await?;

        debug!(count = self.collection.len(), "Results persisted");
        Ok(())
    }

    pub fn collection(&self) -> &ResultCollection {
        &self.collection
    }

    pub fn into_collection(self) -> ResultCollection {
        self.collection
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), SinkError> {
    let wrap = |source: io::Error| SinkError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(wrap)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, contents).await.map_err(wrap)?;
    if let Err(e) = fs::rename(&tmp_path, path).await {
        if let Err(cleanup) = fs::remove_file(&tmp_path).await {
            warn!(path = %tmp_path.display(), "Failed to remove temporary file: {}", cleanup);
        }
        return Err(wrap(e));
    }
    Ok(())
}
