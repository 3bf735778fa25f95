use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use time::OffsetDateTime;

use crate::clock::{datetime_from_ns, Clock, SystemClock};
use crate::config::DEFAULT_EXTENSION;
use crate::error::{IoContext, Result};

const MAX_NAME_ATTEMPTS: u32 = 16;

/// An exception event as handed to a [`RecordWriter`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThrowableReport {
    pub kind: String,
    pub message: String,
    /// Source chain, outermost first.
    pub causes: Vec<String>,
    pub data: BTreeMap<String, String>,
}

impl ThrowableReport {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn from_error(kind: impl Into<String>, err: &(dyn std::error::Error + 'static)) -> Self {
        let mut report = Self::new(kind, err.to_string());
        let mut source = err.source();
        while let Some(cause) = source {
            report.causes.push(cause.to_string());
            source = cause.source();
        }
        report
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// A record that has been persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenRecord {
    pub identifier: String,
    pub path: PathBuf,
}

/// Persists one exception report and says where it went.
pub trait RecordWriter {
    fn write(&self, report: &ThrowableReport) -> Result<WrittenRecord>;
}

impl<W: RecordWriter + ?Sized> RecordWriter for &W {
    fn write(&self, report: &ThrowableReport) -> Result<WrittenRecord> {
        (**self).write(report)
    }
}

/// Writes each report as a text file `<identifier><extension>` in a
/// storage directory, creating the directory on first use.
///
/// Identifiers are `YYYYMMDDHHMMSS` followed by six hex digits, so names
/// are unique per process and sort by write time.
pub struct FileRecordWriter {
    storage_path: PathBuf,
    extension: String,
    clock: Arc<dyn Clock>,
    counter: AtomicU32,
}

impl FileRecordWriter {
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self::with_clock(storage_path, DEFAULT_EXTENSION, Arc::new(SystemClock))
    }

    pub fn with_clock(
        storage_path: impl Into<PathBuf>,
        extension: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage_path: storage_path.into(),
            extension: extension.into(),
            clock,
            counter: AtomicU32::new(0),
        }
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    fn identifier(&self, now: OffsetDateTime, now_ns: u64) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&now_ns.to_le_bytes());
        hasher.update(&std::process::id().to_le_bytes());
        hasher.update(&seq.to_le_bytes());
        let suffix = hasher.finalize() & 0x00ff_ffff;
        format!(
            "{:04}{:02}{:02}{:02}{:02}{:02}{suffix:06x}",
            now.year(),
            now.month() as u8,
            now.day(),
            now.hour(),
            now.minute(),
            now.second()
        )
    }
}

impl RecordWriter for FileRecordWriter {
    fn write(&self, report: &ThrowableReport) -> Result<WrittenRecord> {
        if !self.storage_path.is_dir() {
            fs::create_dir_all(&self.storage_path).io_at("create_dir_all", &self.storage_path)?;
        }

        let now_ns = self.clock.now();
        let now = datetime_from_ns(now_ns)?;
        let mut attempt = 0;
        loop {
            let identifier = self.identifier(now, now_ns);
            let path = self
                .storage_path
                .join(format!("{identifier}{}", self.extension));
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(err)
                    if err.kind() == ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS =>
                {
                    attempt += 1;
                    continue;
                }
                Err(err) => return Err(err).io_at("create", &path),
            };
            file.write_all(render(&identifier, now, report).as_bytes())
                .io_at("write", &path)?;
            return Ok(WrittenRecord { identifier, path });
        }
    }
}

fn render(identifier: &str, at: OffsetDateTime, report: &ThrowableReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Exception {identifier} logged at {:04}-{:02}-{:02} {:02}:{:02}:{:02} UTC",
        at.year(),
        at.month() as u8,
        at.day(),
        at.hour(),
        at.minute(),
        at.second()
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "{}: {}", report.kind, report.message);
    if !report.causes.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Caused by:");
        for (idx, cause) in report.causes.iter().enumerate() {
            let _ = writeln!(out, "  {idx}: {cause}");
        }
    }
    if !report.data.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Additional data:");
        for (key, value) in &report.data {
            let _ = writeln!(out, "  {key}: {value}");
        }
    }
    out
}
