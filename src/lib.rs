//! Bounded exception-report storage.
//!
//! Exception reports are written one file each into a live directory. Once
//! the directory holds more than `keep_count + archive_threshold` records,
//! every record except the newest `keep_count` is moved into a per-day zip
//! container (`exceptions-YYYYMMDD.zip`) under the archive root. Containers
//! only ever grow.
//!
//! [`RotatingStorage`] is the usual entry point: it writes a record and then
//! runs the [`Archiver`], reporting archive failures to an [`ErrorSink`]
//! instead of failing the write.

pub mod archiver;
pub mod clock;
pub mod config;
pub mod container;
pub mod enumerate;
pub mod error;
pub mod layout;
pub mod lock;
pub mod policy;
pub mod sink;
pub mod storage;
pub mod writer;

pub use archiver::{ArchiveOutcome, ArchiveReport, Archiver};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::ArchiverConfig;
pub use container::{Appended, ArchiveContainer, ArchivedEntry, ContainerEntry};
pub use enumerate::{list_records, ExceptionRecord};
pub use error::{Error, Result};
pub use layout::ArchiveLayout;
pub use lock::ArchiveLock;
pub use policy::RetentionPolicy;
pub use sink::{ErrorSink, LogSink};
pub use storage::RotatingStorage;
pub use writer::{FileRecordWriter, RecordWriter, ThrowableReport, WrittenRecord};
