use std::sync::Arc;

use crate::archiver::Archiver;
use crate::clock::{Clock, SystemClock};
use crate::config::ArchiverConfig;
use crate::error::Result;
use crate::sink::{ErrorSink, LogSink};
use crate::writer::{FileRecordWriter, RecordWriter, ThrowableReport, WrittenRecord};

/// Exception storage that keeps its live directory bounded.
///
/// Every write goes through the record writer first. Archiving runs after
/// it and can only ever be reported to the sink: once the record is on
/// disk, the write has succeeded.
pub struct RotatingStorage<W = FileRecordWriter, S = LogSink> {
    writer: W,
    archiver: Archiver,
    sink: S,
}

impl RotatingStorage {
    /// File-backed writer on `live_path`, failures to the log.
    pub fn from_config(config: ArchiverConfig) -> Result<Self> {
        Self::from_config_with_clock(config, Arc::new(SystemClock))
    }

    pub fn from_config_with_clock(config: ArchiverConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let writer = FileRecordWriter::with_clock(
            config.live_path.clone(),
            config.extension.clone(),
            Arc::clone(&clock),
        );
        let archiver = Archiver::with_clock(config, clock)?;
        Ok(Self::new(writer, archiver, LogSink))
    }
}

impl<W: RecordWriter, S: ErrorSink> RotatingStorage<W, S> {
    pub fn new(writer: W, archiver: Archiver, sink: S) -> Self {
        Self {
            writer,
            archiver,
            sink,
        }
    }

    pub fn archiver(&self) -> &Archiver {
        &self.archiver
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Persists `report`, then gives the archiver a chance to run. Only a
    /// failing write is returned as an error.
    pub fn record_and_maybe_archive(&self, report: &ThrowableReport) -> Result<WrittenRecord> {
        let written = self.writer.write(report)?;
        let context = format!(
            "could not bundle exceptions after logging {}",
            written.identifier
        );
        self.archiver.maybe_archive_reported(&context, &self.sink);
        Ok(written)
    }
}
