// Trace identity and current-span context propagation

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

/// Trace ID (128-bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(pub [u8; 16]);

impl TraceId {
    /// Creates a new random trace ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().into_bytes())
    }

    /// Converts to a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().fold(String::with_capacity(32), |mut s, b| {
            let _ = write!(s, "{:02x}", b);
            s
        })
    }

    /// Checks if the trace ID is valid (non-zero).
    pub fn is_valid(&self) -> bool {
        self.0 != [0u8; 16]
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Span ID (64-bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanId(pub [u8; 8]);

impl SpanId {
    /// Creates a new random span ID.
    pub fn new() -> Self {
        use rand::Rng;
        let mut bytes = [0u8; 8];
        rand::thread_rng().fill(&mut bytes);
        Self(bytes)
    }

    /// Converts to a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().fold(String::with_capacity(16), |mut s, b| {
            let _ = write!(s, "{:02x}", b);
            s
        })
    }

    /// Checks if the span ID is valid (non-zero).
    pub fn is_valid(&self) -> bool {
        self.0 != [0u8; 8]
    }
}

impl Default for SpanId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SpanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Identity of a span within a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    /// Whether the context was received from another service.
    pub is_remote: bool,
}

impl SpanContext {
    /// Creates a new root span context.
    pub fn root() -> Self {
        Self {
            trace_id: TraceId::new(),
            span_id: SpanId::new(),
            is_remote: false,
        }
    }

    /// Creates a child context sharing this trace.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: SpanId::new(),
            is_remote: false,
        }
    }

    /// Checks if both ids are valid.
    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }
}

// The current-span stack is per execution context, never a process-wide
// variable, so concurrent producers stay isolated.
thread_local! {
    static CURRENT_STACK: RefCell<Vec<StackEntry>> = const { RefCell::new(Vec::new()) };
}

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

struct StackEntry {
    token_id: u64,
    context: SpanContext,
}

/// Proof of a context attachment, redeemed exactly once by [`detach`].
///
/// Tokens are consumed by value: a second detach of the same attachment is
/// impossible by construction.
#[derive(Debug)]
pub struct ContextToken {
    id: u64,
}

/// Pushes `context` onto this execution context's current-span stack.
pub fn attach(context: SpanContext) -> ContextToken {
    let id = NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed);
    CURRENT_STACK.with(|stack| {
        stack.borrow_mut().push(StackEntry {
            token_id: id,
            context,
        });
    });
    ContextToken { id }
}

/// Pops the attachment identified by `token`.
///
/// Detach order must mirror attach order. A token detached out of order is
/// removed from the middle of the stack with a diagnostic warning; a token
/// from another execution context is ignored.
pub fn detach(token: ContextToken) {
    CURRENT_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        match stack.iter().rposition(|e| e.token_id == token.id) {
            Some(pos) => {
                if pos != stack.len() - 1 {
                    tracing::warn!("context token detached out of order");
                }
                stack.remove(pos);
            }
            None => {
                tracing::warn!("context token does not belong to this execution context");
            }
        }
    });
}

/// The span context nested operations should treat as current, if any.
pub fn current() -> Option<SpanContext> {
    CURRENT_STACK.with(|stack| stack.borrow().last().map(|e| e.context))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_valid_and_distinct() {
        let a = TraceId::new();
        let b = TraceId::new();
        assert!(a.is_valid());
        assert_ne!(a, b);
        assert_eq!(a.to_hex().len(), 32);
        assert_eq!(SpanId::new().to_hex().len(), 16);
    }

    #[test]
    fn test_child_shares_trace() {
        let root = SpanContext::root();
        let child = root.child();
        assert_eq!(root.trace_id, child.trace_id);
        assert_ne!(root.span_id, child.span_id);
        assert!(!child.is_remote);
    }

    #[test]
    fn test_attach_detach_nesting() {
        assert_eq!(current(), None);

        let outer = SpanContext::root();
        let inner = outer.child();

        let outer_token = attach(outer);
        assert_eq!(current(), Some(outer));

        let inner_token = attach(inner);
        assert_eq!(current(), Some(inner));

        detach(inner_token);
        assert_eq!(current(), Some(outer));

        detach(outer_token);
        assert_eq!(current(), None);
    }

    #[test]
    fn test_out_of_order_detach_is_best_effort() {
        let outer_token = attach(SpanContext::root());
        let inner = SpanContext::root();
        let inner_token = attach(inner);

        // detaching the outer token first removes it from the middle
        detach(outer_token);
        assert_eq!(current(), Some(inner));

        detach(inner_token);
        assert_eq!(current(), None);
    }

    #[test]
    fn test_threads_are_isolated() {
        let _token = attach(SpanContext::root());
        let handle = std::thread::spawn(|| current());
        assert_eq!(handle.join().unwrap(), None);
        CURRENT_STACK.with(|s| s.borrow_mut().clear());
    }
}
