//! Test doubles for exercising the emission and export pipeline.
//!
//! These are public so downstream users can assert on emitted telemetry the
//! same way this crate's own tests do.

use crate::emitter::Emitter;
use crate::error::Result;
use crate::export::{ExportOutcome, SpanSink};
use crate::tracer::{FinishedSpanSubmitter, SdkTracer, SpanData, Tracer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Collects finished spans directly from a tracer, no forwarding involved.
#[derive(Default)]
pub struct TestCollector {
    finished: Mutex<Vec<SpanData>>,
}

impl TestCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finished spans in completion order.
    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.finished
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl FinishedSpanSubmitter for TestCollector {
    fn submit(&self, span: SpanData) {
        self.finished
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(span);
    }
}

/// A sink that records every exported batch.
#[derive(Default)]
pub struct InMemorySink {
    spans: Mutex<Vec<SpanData>>,
    shutdown_called: AtomicBool,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All spans exported so far, flattened across batches.
    pub fn exported_spans(&self) -> Vec<SpanData> {
        self.spans.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Whether `shutdown` has been called.
    pub fn shutdown_called(&self) -> bool {
        self.shutdown_called.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SpanSink for InMemorySink {
    async fn export(&self, batch: Vec<SpanData>) -> Result<ExportOutcome> {
        self.spans
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(batch);
        Ok(ExportOutcome::Success)
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdown_called.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn force_flush(&self, _timeout: Duration) -> bool {
        true
    }
}

/// An emitter wired straight to a [`TestCollector`].
pub fn test_emitter() -> (Emitter, Arc<TestCollector>) {
    let collector = Arc::new(TestCollector::new());
    let tracer: Arc<dyn Tracer> = Arc::new(SdkTracer::new(collector.clone()));
    (Emitter::new(tracer), collector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitter_helper_collects_spans() {
        let (emitter, collector) = test_emitter();
        emitter.info("probe", Vec::<(&str, i64)>::new()).unwrap();
        assert_eq!(collector.finished_spans().len(), 1);
    }
}
