//! Metrics pipeline settings.

use serde::Deserialize;
use std::path::PathBuf;

use crate::store::{CsvFileSink, RecordStore};

/// Where and how often the metrics table is written.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Path of the CSV file. Rewritten in full on every flush.
    #[serde(default = "default_metrics_path")]
    pub path: PathBuf,

    /// Number of appended records between rewrites. 1 rewrites on every event.
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
}

fn default_metrics_path() -> PathBuf {
    PathBuf::from("all_metrics.csv")
}

fn default_flush_every() -> usize {
    1
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: default_metrics_path(),
            flush_every: default_flush_every(),
        }
    }
}

impl MetricsConfig {
    /// Builds an empty store backed by the configured CSV file.
    pub fn open_store(&self) -> RecordStore {
        RecordStore::new(CsvFileSink::new(&self.path)).with_flush_every(self.flush_every)
    }
}
