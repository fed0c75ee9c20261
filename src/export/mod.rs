// Export layer: sinks for finished span batches
//
// Sinks deliver batches to a destination. The fallback wrapper guarantees
// at-least-once delivery; the forwarder moves finished spans from the tracer
// to a sink in the background.

pub mod console;
pub mod fallback;
pub mod file;

use crate::error::Result;
use crate::tracer::{FinishedSpanSubmitter, SpanData};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, warn};

pub use console::ConsoleSink;
pub use fallback::FallbackExporter;
pub use file::FileSink;

/// Wire-level result of one export attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportOutcome {
    Success,
    Failure,
}

/// A destination for finished span batches.
///
/// `export` owns its batch for the duration of one attempt. It may fail two
/// ways: returning `Err` (the attempt itself blew up) or `Ok(Failure)` (the
/// destination reported failure). The fallback wrapper treats the two
/// differently on purpose.
#[async_trait::async_trait]
pub trait SpanSink: Send + Sync {
    /// Delivers a batch of finished spans.
    async fn export(&self, batch: Vec<SpanData>) -> Result<ExportOutcome>;

    /// Shuts the sink down, flushing anything buffered.
    async fn shutdown(&self) -> Result<()>;

    /// Flushes buffered data within `timeout`. Returns whether the flush
    /// completed; never fails and is idempotent to repeat.
    async fn force_flush(&self, timeout: Duration) -> bool {
        let _ = timeout;
        true
    }
}

/// Configuration for the background forwarder.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Maximum spans queued before submissions are dropped with a warning.
    pub queue_capacity: usize,
    /// Spans per export batch.
    pub batch_size: usize,
    /// Interval between scheduled flushes of a partial batch.
    pub flush_interval: Duration,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 2048,
            batch_size: 512,
            flush_interval: Duration::from_secs(5),
        }
    }
}

/// Moves finished spans from the tracer to a sink on a background task.
///
/// This is glue, not policy: batches are cut by size or timer, nothing more.
/// Requires a tokio runtime.
pub struct SpanForwarder {
    sender: mpsc::Sender<SpanData>,
    shutdown: watch::Sender<bool>,
}

impl SpanForwarder {
    pub fn new(sink: Arc<dyn SpanSink>, config: ForwarderConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);

        tokio::spawn(Self::run(receiver, shutdown_rx, sink, config));

        Self { sender, shutdown }
    }

    async fn run(
        mut receiver: mpsc::Receiver<SpanData>,
        mut shutdown: watch::Receiver<bool>,
        sink: Arc<dyn SpanSink>,
        config: ForwarderConfig,
    ) {
        let mut batch = Vec::with_capacity(config.batch_size);
        let mut interval = tokio::time::interval(config.flush_interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        while let Ok(span) = receiver.try_recv() {
                            batch.push(span);
                        }
                        if !batch.is_empty() {
                            Self::deliver(&sink, std::mem::take(&mut batch)).await;
                        }
                        if let Err(e) = sink.shutdown().await {
                            error!(error = %e, "sink shutdown failed");
                        }
                        break;
                    }
                }
                Some(span) = receiver.recv() => {
                    batch.push(span);
                    if batch.len() >= config.batch_size {
                        Self::deliver(&sink, std::mem::take(&mut batch)).await;
                    }
                }
                _ = interval.tick() => {
                    if !batch.is_empty() {
                        Self::deliver(&sink, std::mem::take(&mut batch)).await;
                    }
                }
            }
        }
    }

    async fn deliver(sink: &Arc<dyn SpanSink>, batch: Vec<SpanData>) {
        match sink.export(batch).await {
            Ok(ExportOutcome::Success) => {}
            Ok(ExportOutcome::Failure) => warn!("sink reported export failure"),
            Err(e) => error!(error = %e, "failed to export spans"),
        }
    }

    /// Shuts down the background task, flushing what is queued.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl FinishedSpanSubmitter for SpanForwarder {
    fn submit(&self, span: SpanData) {
        if let Err(e) = self.sender.try_send(span) {
            warn!("failed to queue span for export: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemorySink;
    use crate::tracer::{SdkTracer, Tracer};
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_forwarder_delivers_on_batch_size() {
        let sink = Arc::new(InMemorySink::new());
        let forwarder = Arc::new(SpanForwarder::new(
            sink.clone(),
            ForwarderConfig {
                batch_size: 2,
                flush_interval: Duration::from_secs(3600),
                ..Default::default()
            },
        ));

        let tracer = SdkTracer::new(forwarder.clone());
        for name in ["one", "two"] {
            let mut span = tracer.start_span(name, BTreeMap::new(), None);
            span.end(None);
        }

        tokio::time::timeout(Duration::from_secs(1), async {
            while sink.exported_spans().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("spans should be exported once the batch fills");
    }

    #[tokio::test]
    async fn test_forwarder_flushes_on_shutdown() {
        let sink = Arc::new(InMemorySink::new());
        let forwarder = Arc::new(SpanForwarder::new(
            sink.clone(),
            ForwarderConfig {
                batch_size: 100,
                flush_interval: Duration::from_secs(3600),
                ..Default::default()
            },
        ));

        let tracer = SdkTracer::new(forwarder.clone());
        let mut span = tracer.start_span("pending", BTreeMap::new(), None);
        span.end(None);

        forwarder.shutdown();

        tokio::time::timeout(Duration::from_secs(1), async {
            while !sink.shutdown_called() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("shutdown should flush and close the sink");
        assert_eq!(sink.exported_spans().len(), 1);
    }
}
