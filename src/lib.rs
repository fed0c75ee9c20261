//! Emberlog - the emission and export core of a telemetry client.
//!
//! Emberlog turns user-issued span and log calls into well-formed telemetry
//! records and guarantees those records reach a durable sink even when the
//! primary transport fails.
//!
//! # Features
//!
//! - **Attribute normalization**: arbitrary values become protocol-safe
//!   primitives; nulls, oversized integers and structured values all survive
//!   in a recoverable form.
//! - **Span lifecycle**: re-entrant start/end, post-hoc attribute mutation,
//!   and a message template re-rendered with the final attribute values.
//! - **Exception capture**: failures become structured, stack-filtered span
//!   events; cancellation signals are left alone.
//! - **Resilient export**: a fallback sink receives every batch the primary
//!   could not deliver, so "exported" always means "not lost".
//!
//! # Architecture
//!
//! ```text
//! user call
//!    │  Emitter: attributes, tags, sample rate, message template
//!    ▼
//! SpanRecord ──► Tracer ──► SpanForwarder ──► FallbackExporter
//!                                                │        │
//!                                             primary   fallback
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use emberlog::config::EmitterConfig;
//!
//! #[tokio::main]
//! async fn main() -> emberlog::Result<()> {
//!     let (emitter, forwarder) = EmitterConfig::default().build()?;
//!
//!     let mut span = emitter.span("processing {items}", vec![("items", 3i64)])?;
//!     span.enter();
//!     emitter.info("halfway there", Vec::<(&str, i64)>::new())?;
//!     span.exit();
//!
//!     forwarder.shutdown();
//!     Ok(())
//! }
//! ```

pub mod attributes;
pub mod config;
pub mod constants;
pub mod context;
pub mod emitter;
pub mod error;
pub mod exception;
pub mod export;
pub mod format;
pub mod span;
pub mod tags;
pub mod testing;
pub mod tracer;

pub use attributes::{AttributeValue, UserValue};
pub use constants::Level;
pub use emitter::{Emitter, SpanOptions};
pub use error::{EmberlogError, Result};
pub use exception::SpanFailure;
pub use export::{ExportOutcome, FallbackExporter, SpanSink};
pub use span::SpanRecord;
pub use tracer::{SpanData, SpanStatus, Tracer};
