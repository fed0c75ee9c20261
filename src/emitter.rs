// Span and log construction facade

use crate::attributes::{self, AttributeValue, UserValue};
use crate::constants::{
    Level, ATTR_CODE_FILEPATH, ATTR_CODE_LINENO, ATTR_JSON_SCHEMA, ATTR_LEVEL_NAME,
    ATTR_LEVEL_NUM, ATTR_MESSAGE, ATTR_MESSAGE_TEMPLATE, ATTR_SAMPLE_RATE, ATTR_SPAN_TYPE,
    ATTR_TAGS, MESSAGE_FORMAT_FALLBACK, RESERVED_ATTR_PREFIX,
};
use crate::error::{EmberlogError, Result};
use crate::format::format_template;
use crate::span::SpanRecord;
use crate::tags;
use crate::tracer::{SpanStatus, Tracer};
use std::collections::BTreeMap;
use std::panic::Location;
use std::sync::Arc;
use std::time::SystemTime;

/// Per-call options for [`Emitter::span_with`].
#[derive(Debug, Clone, Default)]
pub struct SpanOptions {
    /// Span name; the message template is used when not provided.
    pub span_name: Option<String>,
    /// Sample rate for this record only, overriding the emitter's rate.
    pub sample_rate: Option<f64>,
    /// Tags for this record only, kept ahead of the emitter's scope tags.
    pub tags: Vec<String>,
}

/// The facade that turns user calls into span and log records.
///
/// An emitter is cheap to clone and derive: [`with_tags`](Self::with_tags)
/// and [`with_sample_rate`](Self::with_sample_rate) return new emitters bound
/// to the same tracer.
#[derive(Clone)]
pub struct Emitter {
    tags: Vec<String>,
    sample_rate: Option<f64>,
    tracer: Arc<dyn Tracer>,
}

impl Emitter {
    pub fn new(tracer: Arc<dyn Tracer>) -> Self {
        Self {
            tags: Vec::new(),
            sample_rate: None,
            tracer,
        }
    }

    /// A new emitter with the given tags appended to this one's.
    pub fn with_tags<I, S>(&self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut derived = self.clone();
        derived.tags.extend(tags.into_iter().map(Into::into));
        derived
    }

    /// A new emitter with the given sampling ratio applied.
    ///
    /// The rate must be in `(0, 1]`; anything else is a usage error.
    pub fn with_sample_rate(&self, sample_rate: f64) -> Result<Self> {
        validate_sample_rate(sample_rate)?;
        let mut derived = self.clone();
        derived.sample_rate = Some(sample_rate);
        Ok(derived)
    }

    /// Creates an unstarted span record from a message template.
    ///
    /// The record must be entered to start the underlying span; see
    /// [`SpanRecord`].
    #[track_caller]
    pub fn span<K, V, I>(&self, msg_template: &str, attributes: I) -> Result<SpanRecord>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<UserValue>,
    {
        self.span_with(msg_template, attributes, SpanOptions::default())
    }

    /// Like [`span`](Self::span), with explicit per-call options.
    #[track_caller]
    pub fn span_with<K, V, I>(
        &self,
        msg_template: &str,
        attributes: I,
        options: SpanOptions,
    ) -> Result<SpanRecord>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<UserValue>,
    {
        let prepared = self.prepare(msg_template, attributes, &options, Location::caller())?;
        Ok(SpanRecord::new(
            prepared.span_name,
            prepared.attributes,
            Arc::clone(&self.tracer),
            msg_template.to_string(),
            prepared.bindings,
        ))
    }

    /// Emits a log: a zero-duration, always-successful span.
    ///
    /// Fully synchronous: the underlying span is opened with an explicit
    /// start time, marked OK and closed at the same timestamp.
    #[track_caller]
    pub fn log<K, V, I>(&self, level: Level, msg_template: &str, attributes: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<UserValue>,
    {
        let mut prepared =
            self.prepare(msg_template, attributes, &SpanOptions::default(), Location::caller())?;

        prepared.attributes.insert(
            ATTR_SPAN_TYPE.to_string(),
            AttributeValue::String("log".to_string()),
        );
        prepared.attributes.insert(
            ATTR_LEVEL_NAME.to_string(),
            AttributeValue::String(level.name().to_string()),
        );
        prepared
            .attributes
            .insert(ATTR_LEVEL_NUM.to_string(), AttributeValue::Int(level.number()));

        let start_time = SystemTime::now();
        let mut handle =
            self.tracer
                .start_span(&prepared.message, prepared.attributes, Some(start_time));
        handle.set_status(SpanStatus::Ok);
        handle.end(Some(start_time));
        Ok(())
    }

    #[track_caller]
    pub fn trace<K, V, I>(&self, msg_template: &str, attributes: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<UserValue>,
    {
        self.log(Level::Trace, msg_template, attributes)
    }

    #[track_caller]
    pub fn debug<K, V, I>(&self, msg_template: &str, attributes: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<UserValue>,
    {
        self.log(Level::Debug, msg_template, attributes)
    }

    #[track_caller]
    pub fn info<K, V, I>(&self, msg_template: &str, attributes: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<UserValue>,
    {
        self.log(Level::Info, msg_template, attributes)
    }

    #[track_caller]
    pub fn notice<K, V, I>(&self, msg_template: &str, attributes: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<UserValue>,
    {
        self.log(Level::Notice, msg_template, attributes)
    }

    #[track_caller]
    pub fn warn<K, V, I>(&self, msg_template: &str, attributes: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<UserValue>,
    {
        self.log(Level::Warn, msg_template, attributes)
    }

    #[track_caller]
    pub fn error<K, V, I>(&self, msg_template: &str, attributes: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<UserValue>,
    {
        self.log(Level::Error, msg_template, attributes)
    }

    #[track_caller]
    pub fn fatal<K, V, I>(&self, msg_template: &str, attributes: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<UserValue>,
    {
        self.log(Level::Fatal, msg_template, attributes)
    }

    fn prepare<K, V, I>(
        &self,
        msg_template: &str,
        attributes: I,
        options: &SpanOptions,
        location: &Location<'_>,
    ) -> Result<Prepared>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<UserValue>,
    {
        let user: BTreeMap<String, UserValue> = attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        for key in user.keys() {
            if key.starts_with(RESERVED_ATTR_PREFIX) {
                return Err(EmberlogError::InvalidArgument(format!(
                    "attribute key {:?} uses the reserved {:?} prefix",
                    key, RESERVED_ATTR_PREFIX
                )));
            }
        }
        if let Some(rate) = options.sample_rate {
            validate_sample_rate(rate)?;
        }

        let schema = attributes::json_schema(&user);

        // caller stack location first, user attributes win on collision
        let mut merged: BTreeMap<String, UserValue> = BTreeMap::new();
        merged.insert(
            ATTR_CODE_FILEPATH.to_string(),
            UserValue::String(location.file().to_string()),
        );
        merged.insert(
            ATTR_CODE_LINENO.to_string(),
            UserValue::Int(location.line() as i128),
        );
        merged.extend(user);
        merged.insert(
            ATTR_MESSAGE_TEMPLATE.to_string(),
            UserValue::String(msg_template.to_string()),
        );

        let span_name = options
            .span_name
            .clone()
            .unwrap_or_else(|| msg_template.to_string());

        let mut bindings: BTreeMap<String, String> = merged
            .iter()
            .map(|(k, v)| (k.clone(), v.render()))
            .collect();
        bindings.insert("span_name".to_string(), span_name.clone());

        // the provisional message; re-rendered at span exit with final bindings
        let message = format_template(msg_template, &bindings, MESSAGE_FORMAT_FALLBACK);

        let mut encoded = attributes::encode(&merged);
        encoded.insert(
            ATTR_MESSAGE.to_string(),
            AttributeValue::String(message.clone()),
        );
        if let Some(schema) = schema {
            encoded.insert(ATTR_JSON_SCHEMA.to_string(), AttributeValue::String(schema));
        }

        if let Some(merged_tags) = tags::merge(
            (!options.tags.is_empty()).then_some(&options.tags[..]),
            &self.tags,
        ) {
            encoded.insert(ATTR_TAGS.to_string(), AttributeValue::StringArray(merged_tags));
        }

        // per-call override > emitter override > value already in attributes;
        // the unit rate is implied and never emitted
        let inline = match encoded.remove(ATTR_SAMPLE_RATE) {
            Some(AttributeValue::Float(rate)) => Some(rate),
            Some(other) => {
                tracing::warn!(value = ?other, "ignoring non-numeric inline sample rate");
                None
            }
            None => None,
        };
        let sample_rate = options.sample_rate.or(self.sample_rate).or(inline);
        if let Some(rate) = sample_rate {
            if rate != 1.0 {
                encoded.insert(ATTR_SAMPLE_RATE.to_string(), AttributeValue::Float(rate));
            }
        }

        Ok(Prepared {
            span_name,
            message,
            attributes: encoded,
            bindings,
        })
    }
}

struct Prepared {
    span_name: String,
    message: String,
    attributes: BTreeMap<String, AttributeValue>,
    bindings: BTreeMap<String, String>,
}

fn validate_sample_rate(sample_rate: f64) -> Result<()> {
    if !(sample_rate > 0.0 && sample_rate <= 1.0) {
        return Err(EmberlogError::InvalidArgument(format!(
            "sample_rate must be in (0, 1], got {}",
            sample_rate
        )));
    }
    Ok(())
}
