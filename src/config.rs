//! Configuration for the emission and export pipeline.
//!
//! Every parameter resolves through the same precedence chain:
//! runtime override, then `EMBERLOG_*` environment variable, then the config
//! file, then the built-in default.

use crate::emitter::Emitter;
use crate::error::{EmberlogError, Result};
use crate::export::{
    ConsoleSink, FallbackExporter, FileSink, ForwarderConfig, SpanForwarder, SpanSink,
};
use crate::tracer::{SdkTracer, Tracer};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for an emitter and its export pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    /// Sampling ratio applied to every record, in `(0, 1]`.
    pub sample_rate: Option<f64>,
    /// Whether spans are printed to the console.
    pub console_enabled: bool,
    /// Whether the console sink prints attributes and events.
    pub console_verbose: bool,
    /// File spans are persisted to when the primary sink fails.
    pub fallback_path: Option<PathBuf>,
    /// Interval between scheduled flushes of a partial batch.
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
    /// Maximum spans queued for export.
    pub queue_capacity: usize,
    /// Spans per export batch.
    pub batch_size: usize,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            sample_rate: None,
            console_enabled: true,
            console_verbose: false,
            fallback_path: None,
            flush_interval: Duration::from_secs(5),
            queue_capacity: 2048,
            batch_size: 512,
        }
    }
}

/// Runtime overrides, the highest-precedence configuration source.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub sample_rate: Option<f64>,
    pub console_enabled: Option<bool>,
    pub console_verbose: Option<bool>,
    pub fallback_path: Option<PathBuf>,
    /// Config file to read; no file is read when absent.
    pub config_file: Option<PathBuf>,
}

impl EmitterConfig {
    /// Loads configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EmberlogError::Config(format!("failed to read config file: {}", e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| EmberlogError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves configuration through the full precedence chain.
    pub fn load(overrides: ConfigOverrides) -> Result<Self> {
        let mut config = match &overrides.config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(value) = env_var("EMBERLOG_SAMPLE_RATE") {
            let rate: f64 = value.parse().map_err(|_| {
                EmberlogError::Config(format!("expected EMBERLOG_SAMPLE_RATE to be a float, got {:?}", value))
            })?;
            config.sample_rate = Some(rate);
        }
        if let Some(value) = env_var("EMBERLOG_CONSOLE_ENABLED") {
            config.console_enabled = parse_bool("EMBERLOG_CONSOLE_ENABLED", &value)?;
        }
        if let Some(value) = env_var("EMBERLOG_CONSOLE_VERBOSE") {
            config.console_verbose = parse_bool("EMBERLOG_CONSOLE_VERBOSE", &value)?;
        }
        if let Some(value) = env_var("EMBERLOG_FALLBACK_PATH") {
            config.fallback_path = Some(PathBuf::from(value));
        }

        if let Some(rate) = overrides.sample_rate {
            config.sample_rate = Some(rate);
        }
        if let Some(enabled) = overrides.console_enabled {
            config.console_enabled = enabled;
        }
        if let Some(verbose) = overrides.console_verbose {
            config.console_verbose = verbose;
        }
        if let Some(path) = overrides.fallback_path {
            config.fallback_path = Some(path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if let Some(rate) = self.sample_rate {
            if !(rate > 0.0 && rate <= 1.0) {
                return Err(EmberlogError::Config(format!(
                    "sample_rate must be in (0, 1], got {}",
                    rate
                )));
            }
        }
        if self.batch_size == 0 {
            return Err(EmberlogError::Config("batch_size must be non-zero".into()));
        }
        if self.queue_capacity == 0 {
            return Err(EmberlogError::Config(
                "queue_capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Builds the configured sink stack.
    ///
    /// The console sink is the primary; when a fallback path is configured it
    /// is wrapped so failed batches land in the durable file.
    pub fn build_sink(&self) -> Result<Arc<dyn SpanSink>> {
        let file = match &self.fallback_path {
            Some(path) => Some(Arc::new(FileSink::new(path)?) as Arc<dyn SpanSink>),
            None => None,
        };
        let console = self
            .console_enabled
            .then(|| Arc::new(ConsoleSink::new(self.console_verbose)) as Arc<dyn SpanSink>);

        match (console, file) {
            (Some(primary), Some(fallback)) => {
                Ok(Arc::new(FallbackExporter::new(primary, fallback)))
            }
            (Some(only), None) | (None, Some(only)) => Ok(only),
            (None, None) => Err(EmberlogError::Config(
                "no sink configured: enable the console or set a fallback path".into(),
            )),
        }
    }

    /// Builds the full pipeline: emitter, tracer and background forwarder.
    ///
    /// Requires a tokio runtime. The returned forwarder handle is used to
    /// shut the pipeline down.
    pub fn build(&self) -> Result<(Emitter, Arc<SpanForwarder>)> {
        let sink = self.build_sink()?;
        let forwarder = Arc::new(SpanForwarder::new(
            sink,
            ForwarderConfig {
                queue_capacity: self.queue_capacity,
                batch_size: self.batch_size,
                flush_interval: self.flush_interval,
            },
        ));
        let tracer: Arc<dyn Tracer> = Arc::new(SdkTracer::new(forwarder.clone()));

        let emitter = Emitter::new(tracer);
        let emitter = match self.sample_rate {
            Some(rate) => emitter.with_sample_rate(rate)?,
            None => emitter,
        };
        Ok((emitter, forwarder))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "t" => Ok(true),
        "0" | "false" | "f" => Ok(false),
        _ => Err(EmberlogError::Config(format!(
            "expected {} to be a boolean, got {:?}",
            name, value
        ))),
    }
}
