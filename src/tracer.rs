// Underlying tracer interface and the in-crate reference implementation

use crate::attributes::AttributeValue;
use crate::context::{self, SpanContext, SpanId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Span status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanStatus {
    /// Status not set.
    #[default]
    Unset,
    /// Operation completed successfully.
    Ok,
    /// Operation failed with error.
    Error { message: String },
}

/// A point-in-time event attached to a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp: SystemTime,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl SpanEvent {
    /// Creates a new event stamped with the current time.
    pub fn new(name: impl Into<String>, attributes: BTreeMap<String, AttributeValue>) -> Self {
        Self {
            name: name.into(),
            timestamp: SystemTime::now(),
            attributes,
        }
    }
}

/// Snapshot of a finished span, the element type of export batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanData {
    pub name: String,
    pub context: SpanContext,
    pub parent_span_id: Option<SpanId>,
    pub start_time: SystemTime,
    pub end_time: Option<SystemTime>,
    pub status: SpanStatus,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub events: Vec<SpanEvent>,
}

impl SpanData {
    /// Wall-clock duration, if the span has ended.
    pub fn duration(&self) -> Option<Duration> {
        let end = self.end_time?;
        end.duration_since(self.start_time).ok()
    }
}

/// A live span created by a [`Tracer`].
///
/// All mutation is ignored once the span stops recording.
pub trait SpanHandle: Send {
    /// The span's identity within its trace.
    fn context(&self) -> SpanContext;

    /// Sets an attribute on the live span.
    fn set_attribute(&mut self, key: &str, value: AttributeValue);

    /// Sets the span status.
    fn set_status(&mut self, status: SpanStatus);

    /// Records an exception event. `escaped` marks the exception as having
    /// caused the span's scope to exit abnormally.
    fn record_exception(&mut self, attributes: BTreeMap<String, AttributeValue>, escaped: bool);

    /// Ends the span at `end_time` (now when `None`). Only the first call
    /// takes effect.
    fn end(&mut self, end_time: Option<SystemTime>);

    /// Whether the span still accepts mutation.
    fn is_recording(&self) -> bool;
}

/// Factory for spans. The core calls this once per span activation.
pub trait Tracer: Send + Sync {
    /// Starts a span with the given attribute snapshot, parented from the
    /// current context of the calling thread.
    fn start_span(
        &self,
        name: &str,
        attributes: BTreeMap<String, AttributeValue>,
        start_time: Option<SystemTime>,
    ) -> Box<dyn SpanHandle>;
}

/// Receives finished spans from a tracer, typically a forwarding processor
/// or a test collector.
pub trait FinishedSpanSubmitter: Send + Sync {
    fn submit(&self, span: SpanData);
}

/// Reference [`Tracer`] implementation backing the emission pipeline.
pub struct SdkTracer {
    submitter: Arc<dyn FinishedSpanSubmitter>,
}

impl SdkTracer {
    pub fn new(submitter: Arc<dyn FinishedSpanSubmitter>) -> Self {
        Self { submitter }
    }
}

impl Tracer for SdkTracer {
    fn start_span(
        &self,
        name: &str,
        attributes: BTreeMap<String, AttributeValue>,
        start_time: Option<SystemTime>,
    ) -> Box<dyn SpanHandle> {
        let parent = context::current();
        let span_context = match &parent {
            Some(parent) => parent.child(),
            None => SpanContext::root(),
        };

        Box::new(SdkSpan {
            data: SpanData {
                name: name.to_string(),
                context: span_context,
                parent_span_id: parent.map(|p| p.span_id),
                start_time: start_time.unwrap_or_else(SystemTime::now),
                end_time: None,
                status: SpanStatus::Unset,
                attributes,
                events: Vec::new(),
            },
            recording: true,
            submitter: Arc::clone(&self.submitter),
        })
    }
}

struct SdkSpan {
    data: SpanData,
    recording: bool,
    submitter: Arc<dyn FinishedSpanSubmitter>,
}

impl SpanHandle for SdkSpan {
    fn context(&self) -> SpanContext {
        self.data.context
    }

    fn set_attribute(&mut self, key: &str, value: AttributeValue) {
        if !self.recording {
            return;
        }
        self.data.attributes.insert(key.to_string(), value);
    }

    fn set_status(&mut self, status: SpanStatus) {
        if !self.recording {
            return;
        }
        self.data.status = status;
    }

    fn record_exception(&mut self, attributes: BTreeMap<String, AttributeValue>, escaped: bool) {
        if !self.recording {
            return;
        }
        let mut attributes = attributes;
        attributes.insert(
            "exception.escaped".to_string(),
            AttributeValue::Bool(escaped),
        );
        self.data.events.push(SpanEvent::new("exception", attributes));
    }

    fn end(&mut self, end_time: Option<SystemTime>) {
        if !self.recording {
            return;
        }
        self.recording = false;
        self.data.end_time = Some(end_time.unwrap_or_else(SystemTime::now));
        self.submitter.submit(self.data.clone());
    }

    fn is_recording(&self) -> bool {
        self.recording
    }
}
