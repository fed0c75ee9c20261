// Durable local file sink, JSON lines

use super::{ExportOutcome, SpanSink};
use crate::error::{EmberlogError, Result};
use crate::tracer::SpanData;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Writes each span as one JSON line to a local file.
///
/// This is the durable safety net behind [`FallbackExporter`]
/// (super::fallback::FallbackExporter): spans persisted here can be replayed
/// once the primary destination recovers. An `Err` from this sink therefore
/// means data genuinely was not persisted.
pub struct FileSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileSink {
    /// Opens the sink, creating the file (and appending to an existing one).
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// The file spans are persisted to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush_writer(&self) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writer.flush()?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SpanSink for FileSink {
    async fn export(&self, batch: Vec<SpanData>) -> Result<ExportOutcome> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        for span in &batch {
            let line = serde_json::to_string(span)
                .map_err(|e| EmberlogError::Serialization(e.to_string()))?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(ExportOutcome::Success)
    }

    async fn shutdown(&self) -> Result<()> {
        self.flush_writer()
    }

    async fn force_flush(&self, _timeout: Duration) -> bool {
        self.flush_writer().is_ok()
    }
}
