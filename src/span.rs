// Span lifecycle state machine

use crate::attributes::{encode_value, UserValue};
use crate::constants::{ATTR_MESSAGE, MESSAGE_FORMAT_FALLBACK};
use crate::context::{self, ContextToken};
use crate::error::{EmberlogError, Result};
use crate::exception::{self, SpanFailure};
use crate::format::format_template;
use crate::tracer::{SpanHandle, SpanStatus, Tracer};
use crate::AttributeValue;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One unit of work, from construction through attribute mutation to
/// termination.
///
/// A record moves `Unstarted → Active → Ended`. [`enter`](Self::enter) starts
/// the underlying span at most once; [`exit`](Self::exit) closes the scope at
/// most once; both tolerate repetition. Attributes set while the span is
/// active are forwarded to the live span and to the message bindings, so the
/// message is re-rendered with the final values when the scope closes.
pub struct SpanRecord {
    name: String,
    pending: BTreeMap<String, AttributeValue>,
    tracer: Arc<dyn Tracer>,
    template: String,
    bindings: BTreeMap<String, String>,
    end_on_exit: bool,
    handle: Option<Box<dyn SpanHandle>>,
    token: Option<ContextToken>,
}

impl std::fmt::Debug for SpanRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanRecord")
            .field("name", &self.name)
            .field("pending", &self.pending)
            .field("template", &self.template)
            .field("bindings", &self.bindings)
            .field("end_on_exit", &self.end_on_exit)
            .field("handle", &self.handle.as_ref().map(|_| "<span>"))
            .field("token", &self.token)
            .finish()
    }
}

impl SpanRecord {
    pub(crate) fn new(
        name: String,
        attributes: BTreeMap<String, AttributeValue>,
        tracer: Arc<dyn Tracer>,
        template: String,
        bindings: BTreeMap<String, String>,
    ) -> Self {
        Self {
            name,
            pending: attributes,
            tracer,
            template,
            bindings,
            end_on_exit: true,
            handle: None,
            token: None,
        }
    }

    /// The span name, immutable after construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw message template.
    pub fn message_template(&self) -> &str {
        &self.template
    }

    /// Whether the underlying span will be ended when the scope exits.
    pub fn end_on_exit(&self) -> bool {
        self.end_on_exit
    }

    /// Defers ending the underlying span past scope exit. Read once at exit.
    pub fn set_end_on_exit(&mut self, end_on_exit: bool) {
        self.end_on_exit = end_on_exit;
    }

    /// Enters the span's scope.
    ///
    /// The first call starts the underlying span with the pending attribute
    /// snapshot and attaches a context token so nested operations see this
    /// span as current. Re-entering is idempotent: the span is not re-opened
    /// and no second token is attached.
    pub fn enter(&mut self) {
        self.end_on_exit = true;
        if self.handle.is_none() {
            self.handle =
                Some(
                    self.tracer
                        .start_span(&self.name, std::mem::take(&mut self.pending), None),
                );
        }
        if self.token.is_none() {
            if let Some(handle) = &self.handle {
                self.token = Some(context::attach(handle.context()));
            }
        }
    }

    /// Exits the span's scope normally.
    pub fn exit(&mut self) {
        self.finish_scope(None);
    }

    /// Exits the span's scope with a failure.
    ///
    /// The failure is captured as structured span-failure data unless it is a
    /// cancellation signal, which closes the span with OK status.
    pub fn exit_with(&mut self, failure: &SpanFailure) {
        self.finish_scope(Some(failure));
    }

    fn finish_scope(&mut self, failure: Option<&SpanFailure>) {
        // the token is cleared after first use, so a second exit is a no-op
        let Some(token) = self.token.take() else {
            return;
        };
        context::detach(token);

        let Some(handle) = self.handle.as_mut() else {
            return;
        };

        if handle.is_recording() {
            match failure {
                Some(failure) if !failure.is_cancellation() => {
                    exception::capture(handle.as_mut(), failure);
                }
                _ => handle.set_status(SpanStatus::Ok),
            }

            // attributes may have been set while the span was active, so the
            // message is re-rendered against the latest bindings
            let message =
                format_template(&self.template, &self.bindings, MESSAGE_FORMAT_FALLBACK);
            handle.set_attribute(ATTR_MESSAGE, AttributeValue::String(message));
        }

        if self.end_on_exit {
            handle.end(None);
        }
    }

    /// Runs `f` inside the span's scope.
    ///
    /// An `Err` is captured as span-failure data and returned unchanged to
    /// the caller; this never swallows the error.
    pub fn in_scope<T, E>(&mut self, f: impl FnOnce() -> std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: std::error::Error,
    {
        self.enter();
        let result = f();
        match &result {
            Ok(_) => self.exit(),
            Err(error) => {
                let failure = SpanFailure::from_error(error);
                self.exit_with(&failure);
            }
        }
        result
    }

    /// Sets an attribute on the span.
    ///
    /// Before the span starts this updates the pending snapshot; while it is
    /// active the attribute is forwarded to the live span. Either way the
    /// message bindings are updated so the final render sees the new value.
    /// Mutation after the span has stopped recording is silently dropped.
    pub fn set_attribute(&mut self, key: &str, value: impl Into<UserValue>) {
        let value = value.into();
        self.bindings.insert(key.to_string(), value.render());

        let Some(encoded) = encode_value(&value) else {
            tracing::debug!(key, "null attribute ignored after construction");
            return;
        };

        match self.handle.as_mut() {
            None => {
                self.pending.insert(key.to_string(), encoded);
            }
            Some(handle) => handle.set_attribute(key, encoded),
        }
    }

    /// Sets the current time as the span's end time.
    ///
    /// Only the first call is recorded; ending an already-ended span is a
    /// silent no-op, so an early manual `end` followed by the automatic scope
    /// exit is fine. Ending a record that was never started is a usage error.
    pub fn end(&mut self) -> Result<()> {
        match self.handle.as_mut() {
            None => Err(EmberlogError::InvalidState(
                "span has not been started".into(),
            )),
            Some(handle) => {
                if handle.is_recording() {
                    handle.end(None);
                }
                Ok(())
            }
        }
    }
}

impl Drop for SpanRecord {
    fn drop(&mut self) {
        // a record dropped mid-scope still detaches its context token
        if self.token.is_some() {
            self.finish_scope(None);
        }
    }
}
