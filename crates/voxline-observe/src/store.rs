//! Append-only record store and its CSV backing file.
//!
//! The store keeps every record for the life of the process and rewrites the
//! whole backing file on flush, so the header always lists every column seen
//! so far and the file is self-consistent after each successful write.
//!
//! A failed write never loses a record: it stays in memory and is included in
//! the next rewrite.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use voxline_types::FieldValue;

use crate::error::ObserveError;
use crate::record::{MetricRecord, METRIC_TYPE_COLUMN, TIMESTAMP_COLUMN};

/// Destination for the serialized record table.
pub trait RecordSink: Send {
    /// Replaces the destination's contents with `contents`.
    ///
    /// # Errors
    ///
    /// Returns `ObserveError::Io` if the write fails. Implementations must
    /// leave the previous contents in place on failure.
    fn persist(&mut self, contents: &str) -> Result<(), ObserveError>;

    /// Human-readable location, used in log lines.
    fn describe(&self) -> String;
}

/// Writes the table to a CSV file through a sibling temp file and a rename.
#[derive(Debug, Clone)]
pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "metrics.csv".to_string());
        self.path.with_file_name(format!(".{name}.tmp"))
    }
}

impl RecordSink for CsvFileSink {
    fn persist(&mut self, contents: &str) -> Result<(), ObserveError> {
        let tmp = self.temp_path();
        fs::write(&tmp, contents)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Ordered set of column names, seeded with `timestamp` and `metric_type`.
///
/// New names are appended in first-seen order; existing names never move.
#[derive(Debug, Clone)]
pub struct ColumnOrder {
    names: Vec<String>,
    seen: HashSet<String>,
}

impl ColumnOrder {
    pub fn new() -> Self {
        let mut order = Self {
            names: Vec::new(),
            seen: HashSet::new(),
        };
        order.push(TIMESTAMP_COLUMN);
        order.push(METRIC_TYPE_COLUMN);
        order
    }

    fn push(&mut self, name: &str) -> bool {
        if self.seen.insert(name.to_string()) {
            self.names.push(name.to_string());
            true
        } else {
            false
        }
    }

    /// Adds any columns of `record` not seen before. Returns how many were added.
    pub fn observe(&mut self, record: &MetricRecord) -> usize {
        record
            .fields
            .iter()
            .filter(|(name, _)| self.push(name))
            .count()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Default for ColumnOrder {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a successful [`RecordStore::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The backing file was rewritten and now holds `rows` data rows.
    Persisted { rows: usize },
    /// The record is held in memory; `pending` records await the next flush.
    Buffered { pending: usize },
}

/// Append-only sequence of metric records with a CSV backing sink.
pub struct RecordStore {
    records: Vec<MetricRecord>,
    columns: ColumnOrder,
    sink: Box<dyn RecordSink>,
    flush_every: usize,
    pending: usize,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("records", &self.records.len())
            .field("columns", &self.columns.names())
            .field("sink", &self.sink.describe())
            .field("flush_every", &self.flush_every)
            .field("pending", &self.pending)
            .finish()
    }
}

impl RecordStore {
    /// Creates an empty store that rewrites `sink` after every append.
    pub fn new(sink: impl RecordSink + 'static) -> Self {
        Self {
            records: Vec::new(),
            columns: ColumnOrder::new(),
            sink: Box::new(sink),
            flush_every: 1,
            pending: 0,
        }
    }

    /// Rewrites the sink only once `n` records are pending. Values below 1
    /// are treated as 1.
    pub fn with_flush_every(mut self, n: usize) -> Self {
        self.flush_every = n.max(1);
        self
    }

    /// Appends `record` and rewrites the sink if the flush threshold is met.
    ///
    /// # Errors
    ///
    /// Returns the sink's error if the rewrite fails. The record has already
    /// been retained in memory when this happens.
    pub fn append(&mut self, record: MetricRecord) -> Result<AppendOutcome, ObserveError> {
        let added = self.columns.observe(&record);
        if added > 0 {
            tracing::debug!(added, total = self.columns.names().len(), "new metrics columns");
        }
        self.records.push(record);
        self.pending += 1;

        if self.pending < self.flush_every {
            return Ok(AppendOutcome::Buffered {
                pending: self.pending,
            });
        }

        self.flush()?;
        Ok(AppendOutcome::Persisted {
            rows: self.records.len(),
        })
    }

    /// Rewrites the sink with every record held so far.
    ///
    /// # Errors
    ///
    /// Returns the sink's error; in-memory state is unchanged.
    pub fn flush(&mut self) -> Result<(), ObserveError> {
        let table = render_csv(self.columns.names(), &self.records);
        self.sink.persist(&table)?;
        self.pending = 0;
        Ok(())
    }

    pub fn records(&self) -> &[MetricRecord] {
        &self.records
    }

    pub fn columns(&self) -> &[String] {
        self.columns.names()
    }

    /// Records appended since the last successful flush.
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn describe_sink(&self) -> String {
        self.sink.describe()
    }
}

/// Serializes `records` as CSV with a header row of `columns`.
pub fn render_csv(columns: &[String], records: &[MetricRecord]) -> String {
    let mut out = String::new();
    push_row(&mut out, columns.iter().map(|c| escape_cell(c)));
    for record in records {
        push_row(
            &mut out,
            columns
                .iter()
                .map(|c| record.get(c).map(|v| escape_cell(&encode_value(&v))).unwrap_or_default()),
        );
    }
    out
}

fn push_row(out: &mut String, cells: impl Iterator<Item = String>) {
    for (i, cell) in cells.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&cell);
    }
    out.push('\n');
}

/// Renders a single value as CSV cell text (before quoting).
pub fn encode_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Int(i) => i.to_string(),
        FieldValue::Float(f) if f.is_finite() && f.fract() == 0.0 => format!("{f:.1}"),
        FieldValue::Float(f) => f.to_string(),
        FieldValue::Bool(b) => b.to_string(),
        FieldValue::Text(s) => s.clone(),
        FieldValue::Empty => String::new(),
    }
}

fn escape_cell(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}
