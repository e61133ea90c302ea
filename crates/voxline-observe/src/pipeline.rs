//! Single-consumer metrics pipeline.
//!
//! Event handlers only enqueue; one background task owns the
//! [`RecordStore`] and performs every normalize, append and rewrite in
//! arrival order. Two events can therefore never interleave inside the store,
//! no matter how many emitters submit at once.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use voxline_types::{MetricEvent, MetricKind, MetricsHandler};

use crate::error::ObserveError;
use crate::format::format_metrics;
use crate::record::{normalize, normalize_raw, MetricRecord, RawMetricEvent};
use crate::store::{AppendOutcome, RecordStore};

#[derive(Debug)]
enum Command {
    Record { kind: MetricKind, event: MetricEvent },
    Raw(RawMetricEvent),
    Flush(oneshot::Sender<Result<(), ObserveError>>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable submission side of the pipeline.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl MetricsHandle {
    fn send(&self, command: Command) -> Result<(), ObserveError> {
        self.tx.send(command).map_err(|_| ObserveError::PipelineClosed)
    }

    /// Enqueues a typed event declared as `kind`. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns `ObserveError::PipelineClosed` after shutdown.
    pub fn submit(&self, kind: MetricKind, event: MetricEvent) -> Result<(), ObserveError> {
        self.send(Command::Record { kind, event })
    }

    /// Enqueues an untyped event. Its kind tag is checked by the consumer.
    ///
    /// # Errors
    ///
    /// Returns `ObserveError::PipelineClosed` after shutdown.
    pub fn submit_raw(&self, raw: RawMetricEvent) -> Result<(), ObserveError> {
        self.send(Command::Raw(raw))
    }

    /// Waits until everything submitted before this call has been processed,
    /// then forces a rewrite of the backing file.
    ///
    /// # Errors
    ///
    /// Returns the sink error from the forced rewrite, or
    /// `ObserveError::PipelineClosed` if the consumer has stopped.
    pub async fn flush(&self) -> Result<(), ObserveError> {
        let (reply, done) = oneshot::channel();
        self.send(Command::Flush(reply))?;
        done.await.map_err(|_| ObserveError::PipelineClosed)?
    }

    /// Builds a subscription callback that submits every event as `kind`.
    ///
    /// The callback never blocks and never panics; a closed pipeline is
    /// logged and the event dropped.
    pub fn handler(&self, kind: MetricKind) -> MetricsHandler {
        let handle = self.clone();
        Arc::new(move |event: MetricEvent| {
            if let Err(e) = handle.submit(kind, event) {
                tracing::warn!(metric_type = kind.as_str(), "dropping metrics event: {}", e);
            }
        })
    }
}

/// A running pipeline: the consumer task plus a handle to feed it.
#[derive(Debug)]
pub struct MetricsPipeline {
    handle: MetricsHandle,
    task: JoinHandle<RecordStore>,
}

impl MetricsPipeline {
    /// Moves `store` onto a new consumer task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(store: RecordStore) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tracing::info!(sink = %store.describe_sink(), "starting metrics pipeline");
        let task = tokio::spawn(run(store, rx));
        Self {
            handle: MetricsHandle { tx },
            task,
        }
    }

    pub fn handle(&self) -> MetricsHandle {
        self.handle.clone()
    }

    /// Processes everything already queued, writes the file one last time,
    /// stops the consumer and returns the store.
    ///
    /// Events submitted after this call are rejected with
    /// `ObserveError::PipelineClosed`.
    ///
    /// # Errors
    ///
    /// Returns `ObserveError::PipelineClosed` if the consumer already exited
    /// abnormally.
    pub async fn shutdown(self) -> Result<RecordStore, ObserveError> {
        let (reply, done) = oneshot::channel();
        self.handle.send(Command::Shutdown(reply))?;
        let _ = done.await;
        self.task.await.map_err(|e| {
            tracing::error!("metrics pipeline task failed: {}", e);
            ObserveError::PipelineClosed
        })
    }
}

async fn run(mut store: RecordStore, mut rx: mpsc::UnboundedReceiver<Command>) -> RecordStore {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Shutdown(reply) => {
                rx.close();
                // Anything accepted before close() still gets recorded.
                while let Ok(late) = rx.try_recv() {
                    process(&mut store, late);
                }
                if let Err(e) = store.flush() {
                    tracing::error!(sink = %store.describe_sink(), "final metrics flush failed: {}", e);
                }
                tracing::info!(
                    records = store.records().len(),
                    sink = %store.describe_sink(),
                    "metrics pipeline stopped"
                );
                let _ = reply.send(());
                break;
            }
            other => process(&mut store, other),
        }
    }
    store
}

fn process(store: &mut RecordStore, command: Command) {
    match command {
        Command::Record { kind, event } => match normalize(&event, kind, Utc::now()) {
            Ok(record) => {
                tracing::info!("{}", format_metrics(&event));
                append(store, record);
            }
            Err(e) => tracing::warn!("{}", e),
        },
        Command::Raw(raw) => match normalize_raw(&raw, Utc::now()) {
            Ok(record) => append(store, record),
            Err(e) => tracing::warn!("{}", e),
        },
        Command::Flush(reply) => {
            let _ = reply.send(store.flush());
        }
        Command::Shutdown(reply) => {
            let _ = reply.send(());
        }
    }
}

fn append(store: &mut RecordStore, record: MetricRecord) {
    let metric_type = record.metric_type;
    match store.append(record) {
        Ok(AppendOutcome::Persisted { rows }) => {
            tracing::debug!(metric_type = metric_type.as_str(), rows, "updated {}", store.describe_sink());
        }
        Ok(AppendOutcome::Buffered { pending }) => {
            tracing::debug!(metric_type = metric_type.as_str(), pending, "metrics record buffered");
        }
        Err(e) => {
            tracing::error!(
                metric_type = metric_type.as_str(),
                sink = %store.describe_sink(),
                pending = store.pending(),
                "failed to write metrics: {}",
                e
            );
        }
    }
}
