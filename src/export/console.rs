// Console sink for debugging

use super::{ExportOutcome, SpanSink};
use crate::error::Result;
use crate::tracer::SpanData;

/// Prints spans to stdout in a human-readable form.
pub struct ConsoleSink {
    verbose: bool,
}

impl ConsoleSink {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

#[async_trait::async_trait]
impl SpanSink for ConsoleSink {
    async fn export(&self, batch: Vec<SpanData>) -> Result<ExportOutcome> {
        for span in batch {
            println!("Span: {} [{}]", span.name, span.context.trace_id);
            println!("  Status: {:?}", span.status);
            if let Some(duration) = span.duration() {
                println!("  Duration: {:?}", duration);
            }
            if self.verbose {
                for (key, value) in &span.attributes {
                    println!("  {}: {:?}", key, value);
                }
                for event in &span.events {
                    println!("  Event: {}", event.name);
                }
            }
            println!();
        }
        Ok(ExportOutcome::Success)
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SpanContext;
    use crate::tracer::SpanStatus;
    use std::collections::BTreeMap;
    use std::time::SystemTime;

    #[tokio::test]
    async fn test_console_export_succeeds() {
        let sink = ConsoleSink::new(true);
        let span = SpanData {
            name: "printed".into(),
            context: SpanContext::root(),
            parent_span_id: None,
            start_time: SystemTime::UNIX_EPOCH,
            end_time: Some(SystemTime::UNIX_EPOCH),
            status: SpanStatus::Ok,
            attributes: BTreeMap::new(),
            events: Vec::new(),
        };

        let outcome = sink.export(vec![span]).await.unwrap();
        assert_eq!(outcome, ExportOutcome::Success);
        assert!(sink.shutdown().await.is_ok());
    }
}
