// Exception capture: structured, filtered failure data attached to spans

use crate::attributes::{json_dumps, AttributeValue};
use crate::constants::{ATTR_EXCEPTION_TRACE, ATTR_VALIDATION_ERROR};
use crate::tracer::{SpanHandle, SpanStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One call-stack frame of a captured failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracebackFrame {
    pub file: String,
    pub line: u32,
    pub function: String,
    /// Summary of interesting local bindings, rendered to strings.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub locals: BTreeMap<String, String>,
}

/// Ordered call-stack frames, innermost last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traceback {
    pub frames: Vec<TracebackFrame>,
}

impl Traceback {
    /// Drops frames belonging to the capture mechanism itself so the recorded
    /// stack shows only user code.
    fn filtered(&self) -> Traceback {
        Traceback {
            frames: self
                .frames
                .iter()
                .filter(|f| !is_capture_machinery(&f.file))
                .cloned()
                .collect(),
        }
    }
}

/// What category of failure a span exited with.
///
/// A closed set: dispatch is over these variants, never over reflective
/// inspection of the error value.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureKind {
    /// A true user-visible error.
    Error,
    /// An error carrying a structured validation payload.
    Validation(serde_json::Value),
    /// A control-flow signal used to implement cancellation. Not an error:
    /// never captured, never flips span status.
    Cancellation,
}

/// An in-flight failure as observed at span exit.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanFailure {
    kind_name: String,
    message: String,
    kind: FailureKind,
    traceback: Traceback,
}

impl SpanFailure {
    /// Builds a failure from any standard error, using the error type's short
    /// name as the kind name.
    pub fn from_error<E: std::error::Error>(error: &E) -> Self {
        let type_name = std::any::type_name::<E>();
        let kind_name = type_name.rsplit("::").next().unwrap_or(type_name);
        Self {
            kind_name: kind_name.to_string(),
            message: error.to_string(),
            kind: FailureKind::Error,
            traceback: Traceback::default(),
        }
    }

    /// Builds a validation failure with its structured payload. The payload
    /// must not contain embedded resource URLs; callers strip them before
    /// constructing the failure.
    pub fn validation(
        kind_name: impl Into<String>,
        message: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            kind_name: kind_name.into(),
            message: message.into(),
            kind: FailureKind::Validation(payload),
            traceback: Traceback::default(),
        }
    }

    /// Builds a cancellation signal.
    pub fn cancellation() -> Self {
        Self {
            kind_name: "Cancelled".to_string(),
            message: String::new(),
            kind: FailureKind::Cancellation,
            traceback: Traceback::default(),
        }
    }

    /// Appends a call-stack frame, outermost first.
    pub fn with_frame(
        mut self,
        file: impl Into<String>,
        line: u32,
        function: impl Into<String>,
    ) -> Self {
        self.traceback.frames.push(TracebackFrame {
            file: file.into(),
            line,
            function: function.into(),
            locals: BTreeMap::new(),
        });
        self
    }

    /// Attaches a locals summary to the most recent frame.
    pub fn with_locals(mut self, locals: BTreeMap<String, String>) -> Self {
        if let Some(frame) = self.traceback.frames.last_mut() {
            frame.locals = locals;
        }
        self
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self.kind, FailureKind::Cancellation)
    }

    /// The status description recorded on the span: `"{KindName}: {message}"`.
    pub fn status_description(&self) -> String {
        format!("{}: {}", self.kind_name, self.message)
    }
}

// matches both in-repo paths and the vendored `emberlog-x.y.z/src/` form
fn is_capture_machinery(file: &str) -> bool {
    file.contains("emberlog") && file.contains("src/")
}

/// Captures `failure` on a span that is still recording.
///
/// Sets error status, records the exception as an escaped span event with the
/// filtered traceback attached, and surfaces any validation payload on both
/// the span and the event. Never fails: if structuring the data fails, the
/// exception is still recorded, just without the extra attributes.
pub fn capture(span: &mut dyn SpanHandle, failure: &SpanFailure) {
    if !span.is_recording() {
        return;
    }
    // cancellation is not a real error and is handled by the caller
    if failure.is_cancellation() {
        return;
    }

    span.set_status(SpanStatus::Error {
        message: failure.status_description(),
    });

    let mut event_attrs = BTreeMap::new();
    event_attrs.insert(
        "exception.type".to_string(),
        AttributeValue::String(failure.kind_name.clone()),
    );
    event_attrs.insert(
        "exception.message".to_string(),
        AttributeValue::String(failure.message.clone()),
    );

    match serde_json::to_value(failure.traceback.filtered()) {
        Ok(trace) => {
            event_attrs.insert(
                ATTR_EXCEPTION_TRACE.to_string(),
                AttributeValue::String(json_dumps(&trace)),
            );
        }
        Err(err) => {
            tracing::debug!(error = %err, "could not serialize traceback, recording without it");
        }
    }

    if let FailureKind::Validation(payload) = &failure.kind {
        let payload_json = json_dumps(payload);
        span.set_attribute(
            ATTR_VALIDATION_ERROR,
            AttributeValue::String(payload_json.clone()),
        );
        event_attrs.insert(
            ATTR_VALIDATION_ERROR.to_string(),
            AttributeValue::String(payload_json),
        );
    }

    span.record_exception(event_attrs, true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestCollector;
    use crate::tracer::{SdkTracer, Tracer};
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Debug)]
    struct BoomError;

    impl std::fmt::Display for BoomError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "boom")
        }
    }

    impl std::error::Error for BoomError {}

    fn start_test_span() -> (Box<dyn SpanHandle>, Arc<TestCollector>) {
        let collector = Arc::new(TestCollector::new());
        let tracer = SdkTracer::new(collector.clone());
        let span = tracer.start_span("failing", BTreeMap::new(), None);
        (span, collector)
    }

    #[test]
    fn test_status_description_format() {
        let failure = SpanFailure::from_error(&BoomError);
        assert_eq!(failure.status_description(), "BoomError: boom");
    }

    #[test]
    fn test_capture_sets_error_status_and_event() {
        let (mut span, collector) = start_test_span();
        let failure = SpanFailure::from_error(&BoomError)
            .with_frame("src/app.rs", 42, "handle_request");

        capture(span.as_mut(), &failure);
        span.end(None);

        let finished = collector.finished_spans();
        assert_eq!(
            finished[0].status,
            SpanStatus::Error {
                message: "BoomError: boom".into()
            }
        );

        let event = &finished[0].events[0];
        assert_eq!(event.name, "exception");
        assert_eq!(
            event.attributes["exception.type"],
            AttributeValue::String("BoomError".into())
        );
        assert_eq!(
            event.attributes["exception.escaped"],
            AttributeValue::Bool(true)
        );

        let trace = match &event.attributes[ATTR_EXCEPTION_TRACE] {
            AttributeValue::String(s) => s.clone(),
            other => panic!("expected string traceback, got {:?}", other),
        };
        assert!(trace.contains("handle_request"));
    }

    #[test]
    fn test_recorder_frames_filtered_out() {
        let (mut span, collector) = start_test_span();
        let failure = SpanFailure::from_error(&BoomError)
            .with_frame("src/app.rs", 7, "user_code")
            .with_frame("emberlog/src/exception.rs", 99, "capture");

        capture(span.as_mut(), &failure);
        span.end(None);

        let finished = collector.finished_spans();
        let trace = match &finished[0].events[0].attributes[ATTR_EXCEPTION_TRACE] {
            AttributeValue::String(s) => s.clone(),
            other => panic!("expected string traceback, got {:?}", other),
        };
        assert!(trace.contains("user_code"));
        assert!(!trace.contains("capture"));
    }

    #[test]
    fn test_validation_payload_on_span_and_event() {
        let (mut span, collector) = start_test_span();
        let payload = json!([{"loc": ["body", "age"], "msg": "value is not a valid integer"}]);
        let failure = SpanFailure::validation("ValidationError", "1 validation error", payload);

        capture(span.as_mut(), &failure);
        span.end(None);

        let finished = collector.finished_spans();
        let on_span = &finished[0].attributes[ATTR_VALIDATION_ERROR];
        let on_event = &finished[0].events[0].attributes[ATTR_VALIDATION_ERROR];
        assert_eq!(on_span, on_event);
    }

    #[test]
    fn test_cancellation_is_not_captured() {
        let (mut span, collector) = start_test_span();
        capture(span.as_mut(), &SpanFailure::cancellation());
        span.end(None);

        let finished = collector.finished_spans();
        assert_eq!(finished[0].status, SpanStatus::Unset);
        assert!(finished[0].events.is_empty());
    }

    #[test]
    fn test_capture_after_end_is_dropped() {
        let (mut span, collector) = start_test_span();
        span.end(None);
        capture(span.as_mut(), &SpanFailure::from_error(&BoomError));

        let finished = collector.finished_spans();
        assert_eq!(finished[0].status, SpanStatus::Unset);
        assert!(finished[0].events.is_empty());
    }
}
