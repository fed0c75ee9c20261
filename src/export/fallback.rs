// Two-sink wrapper enforcing at-least-once delivery

use super::{ExportOutcome, SpanSink};
use crate::error::Result;
use crate::tracer::SpanData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Wraps a primary sink with a fallback that receives every batch the primary
/// could not deliver.
///
/// The two failure modes of the primary are treated asymmetrically. This
/// asymmetry is observable, contractual behavior:
///
/// - the primary's `export` returns `Err`: the fallback receives the batch
///   first, then the same error propagates to the caller;
/// - the primary returns `Ok(Failure)`: the fallback receives the batch and
///   the call reports `Ok(Success)`, since the fallback already guarantees
///   durability.
///
/// Export is commonly invoked from a background flush task; "success" here
/// always means "telemetry is not lost", never "telemetry reached the
/// primary destination".
pub struct FallbackExporter {
    primary: Arc<dyn SpanSink>,
    fallback: Arc<dyn SpanSink>,
}

impl FallbackExporter {
    pub fn new(primary: Arc<dyn SpanSink>, fallback: Arc<dyn SpanSink>) -> Self {
        Self { primary, fallback }
    }

    async fn write_fallback(&self, batch: Vec<SpanData>) {
        match self.fallback.export(batch).await {
            Ok(ExportOutcome::Success) => {}
            Ok(ExportOutcome::Failure) => {
                error!("fallback sink reported failure, batch may be lost");
            }
            Err(e) => {
                error!(error = %e, "fallback sink failed, batch may be lost");
            }
        }
    }
}

#[async_trait::async_trait]
impl SpanSink for FallbackExporter {
    async fn export(&self, batch: Vec<SpanData>) -> Result<ExportOutcome> {
        match self.primary.export(batch.clone()).await {
            Ok(ExportOutcome::Success) => Ok(ExportOutcome::Success),
            Ok(ExportOutcome::Failure) => {
                warn!("primary sink reported failure, writing batch to fallback");
                self.write_fallback(batch).await;
                Ok(ExportOutcome::Success)
            }
            Err(e) => {
                warn!(error = %e, "primary sink failed, writing batch to fallback");
                self.write_fallback(batch).await;
                Err(e)
            }
        }
    }

    async fn shutdown(&self) -> Result<()> {
        let primary = self.primary.shutdown().await;
        // the fallback is shut down even when the primary's shutdown failed
        let fallback = self.fallback.shutdown().await;
        primary.and(fallback)
    }

    async fn force_flush(&self, timeout: Duration) -> bool {
        let both = async {
            let (primary, fallback) = tokio::join!(
                self.primary.force_flush(timeout),
                self.fallback.force_flush(timeout),
            );
            primary && fallback
        };
        tokio::time::timeout(timeout, both).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SpanContext;
    use crate::error::EmberlogError;
    use crate::testing::InMemorySink;
    use crate::tracer::SpanStatus;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::SystemTime;

    struct ExceptionSink;

    #[async_trait::async_trait]
    impl SpanSink for ExceptionSink {
        async fn export(&self, _batch: Vec<SpanData>) -> Result<ExportOutcome> {
            Err(EmberlogError::Export("Bad exporter".into()))
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    struct FailureSink;

    #[async_trait::async_trait]
    impl SpanSink for FailureSink {
        async fn export(&self, _batch: Vec<SpanData>) -> Result<ExportOutcome> {
            Ok(ExportOutcome::Failure)
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    struct BrokenShutdownSink {
        shutdown_attempted: AtomicBool,
    }

    #[async_trait::async_trait]
    impl SpanSink for BrokenShutdownSink {
        async fn export(&self, _batch: Vec<SpanData>) -> Result<ExportOutcome> {
            Ok(ExportOutcome::Success)
        }

        async fn shutdown(&self) -> Result<()> {
            self.shutdown_attempted.store(true, Ordering::SeqCst);
            Err(EmberlogError::Export("shutdown failed".into()))
        }
    }

    fn test_span() -> SpanData {
        SpanData {
            name: "test".into(),
            context: SpanContext::root(),
            parent_span_id: None,
            start_time: SystemTime::UNIX_EPOCH,
            end_time: Some(SystemTime::UNIX_EPOCH),
            status: SpanStatus::Ok,
            attributes: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_fallback_on_exception() {
        let fallback = Arc::new(InMemorySink::new());
        let exporter = FallbackExporter::new(Arc::new(ExceptionSink), fallback.clone());

        let span = test_span();
        let err = exporter.export(vec![span.clone()]).await.unwrap_err();
        assert!(matches!(err, EmberlogError::Export(ref m) if m == "Bad exporter"));

        // the fallback received the exact batch before the error surfaced
        let exported = fallback.exported_spans();
        assert_eq!(exported, vec![span]);
    }

    #[tokio::test]
    async fn test_fallback_on_failure_result() {
        let fallback = Arc::new(InMemorySink::new());
        let exporter = FallbackExporter::new(Arc::new(FailureSink), fallback.clone());

        let span = test_span();
        let outcome = exporter.export(vec![span.clone()]).await.unwrap();
        assert_eq!(outcome, ExportOutcome::Success);
        assert_eq!(fallback.exported_spans(), vec![span]);
    }

    #[tokio::test]
    async fn test_success_skips_fallback() {
        let primary = Arc::new(InMemorySink::new());
        let fallback = Arc::new(InMemorySink::new());
        let exporter = FallbackExporter::new(primary.clone(), fallback.clone());

        let outcome = exporter.export(vec![test_span()]).await.unwrap();
        assert_eq!(outcome, ExportOutcome::Success);
        assert_eq!(primary.exported_spans().len(), 1);
        assert!(fallback.exported_spans().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_reaches_fallback_despite_primary_error() {
        let primary = Arc::new(BrokenShutdownSink {
            shutdown_attempted: AtomicBool::new(false),
        });
        let fallback = Arc::new(InMemorySink::new());
        let exporter = FallbackExporter::new(primary.clone(), fallback.clone());

        let result = exporter.shutdown().await;
        assert!(result.is_err());
        assert!(primary.shutdown_attempted.load(Ordering::SeqCst));
        assert!(fallback.shutdown_called());
    }

    #[tokio::test]
    async fn test_force_flush_is_bounded_and_repeatable() {
        let primary = Arc::new(InMemorySink::new());
        let fallback = Arc::new(InMemorySink::new());
        let exporter = FallbackExporter::new(primary, fallback);

        assert!(exporter.force_flush(Duration::from_millis(100)).await);
        assert!(exporter.force_flush(Duration::from_millis(100)).await);
    }

    #[tokio::test]
    async fn test_context_fields_survive_fallback() {
        let fallback = Arc::new(InMemorySink::new());
        let exporter = FallbackExporter::new(Arc::new(ExceptionSink), fallback.clone());

        let span = test_span();
        let context = span.context;
        let _ = exporter.export(vec![span]).await;

        let exported = fallback.exported_spans();
        assert_eq!(exported[0].context.trace_id, context.trace_id);
        assert_eq!(exported[0].context.span_id, context.span_id);
        assert!(!exported[0].context.is_remote);
    }
}
