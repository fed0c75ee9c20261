// Reserved attribute keys and level numbering shared with downstream consumers

use serde::{Deserialize, Serialize};

/// Prefix reserved for emberlog's own bookkeeping attributes.
///
/// User attribute keys starting with this prefix are rejected at the public
/// call boundary.
pub const RESERVED_ATTR_PREFIX: &str = "emberlog.";

/// The raw message template of a span or log.
pub const ATTR_MESSAGE_TEMPLATE: &str = "emberlog.msg_template";
/// The rendered message, re-evaluated against the final attribute bindings.
pub const ATTR_MESSAGE: &str = "emberlog.msg";
/// Ordered, deduplicated tags.
pub const ATTR_TAGS: &str = "emberlog.tags";
/// Effective sample rate; omitted when it is exactly 1.
pub const ATTR_SAMPLE_RATE: &str = "emberlog.sample_rate";
/// Names of attributes whose value was null at encode time.
pub const ATTR_NULL_ARGS: &str = "emberlog.null_args";
/// JSON schema describing which attributes carry JSON-encoded values.
pub const ATTR_JSON_SCHEMA: &str = "emberlog.json_schema";
/// Structured validation-error payload, set on both span and exception event.
pub const ATTR_VALIDATION_ERROR: &str = "emberlog.validation_error";
/// Log level name ("info", "warn", ...).
pub const ATTR_LEVEL_NAME: &str = "emberlog.level_name";
/// Numeric log level, see [`Level::number`].
pub const ATTR_LEVEL_NUM: &str = "emberlog.level_num";
/// Record kind: "span" or "log".
pub const ATTR_SPAN_TYPE: &str = "emberlog.span_type";
/// Structured traceback attached to exception events.
pub const ATTR_EXCEPTION_TRACE: &str = "emberlog.exception_trace";

/// Caller source file path.
pub const ATTR_CODE_FILEPATH: &str = "code.filepath";
/// Caller source line number.
pub const ATTR_CODE_LINENO: &str = "code.lineno";

/// Largest integer magnitude representable in a signed 64-bit attribute.
pub const MAX_INT_ATTRIBUTE: i128 = i64::MAX as i128;

/// Fallback text used when message formatting itself fails.
pub const MESSAGE_FORMAT_FALLBACK: &str = "...";

/// Log severity level.
///
/// The numbers leave gaps so external level schemes can be mapped in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Notice,
    Warn,
    Error,
    Fatal,
}

impl Level {
    /// The level name as it appears in emitted attributes.
    pub fn name(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Notice => "notice",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }

    /// The numeric severity emitted under [`ATTR_LEVEL_NUM`].
    pub fn number(&self) -> i64 {
        match self {
            Level::Trace => 1,
            Level::Debug => 5,
            Level::Info => 9,
            Level::Notice => 10,
            Level::Warn => 13,
            Level::Error => 17,
            Level::Fatal => 21,
        }
    }

    /// Parses a level name.
    ///
    /// An unknown name degrades to [`Level::Error`] with a diagnostic warning
    /// rather than failing, so a bad level string never suppresses a log call.
    pub fn parse(name: &str) -> Level {
        match name {
            "trace" => Level::Trace,
            "debug" => Level::Debug,
            "info" => Level::Info,
            "notice" => Level::Notice,
            "warn" => Level::Warn,
            "error" => Level::Error,
            "fatal" => Level::Fatal,
            other => {
                tracing::warn!(level = other, "invalid log level, using \"error\"");
                Level::Error
            }
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
