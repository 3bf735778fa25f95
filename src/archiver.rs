use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::clock::{self, Clock, SystemClock};
use crate::config::ArchiverConfig;
use crate::container::{ArchiveContainer, ArchivedEntry};
use crate::enumerate::{list_records, ExceptionRecord};
use crate::error::{IoContext, Result};
use crate::layout::ArchiveLayout;
use crate::lock::ArchiveLock;
use crate::sink::ErrorSink;

/// Result of one [`Archiver::maybe_archive`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// At or below the trigger level. Only the directory listing ran.
    Idle { live: usize },
    /// Another holder has the live directory's lock.
    Contended,
    Archived(ArchiveReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReport {
    pub container: PathBuf,
    pub live_before: usize,
    pub entries: Vec<ArchivedEntry>,
}

impl ArchiveReport {
    pub fn live_after(&self) -> usize {
        self.live_before - self.entries.len()
    }
}

/// Moves the oldest records of a live directory into the day's container
/// once the directory grows past its retention policy.
///
/// State is re-derived from the directory on every call, so an interrupted
/// pass is finished by the next one. One archiving process per live
/// directory is assumed unless `lock` is set in the config.
pub struct Archiver {
    config: ArchiverConfig,
    layout: ArchiveLayout,
    clock: Arc<dyn Clock>,
}

impl Archiver {
    pub fn new(config: ArchiverConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ArchiverConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let layout = ArchiveLayout::new(config.archive_root(), config.container_prefix.clone());
        Ok(Self {
            config,
            layout,
            clock,
        })
    }

    pub fn config(&self) -> &ArchiverConfig {
        &self.config
    }

    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    pub fn live_records(&self) -> Result<Vec<ExceptionRecord>> {
        list_records(&self.config.live_path, &self.config.extension)
    }

    /// Container the next pass would write to.
    pub fn todays_container(&self) -> Result<ArchiveContainer> {
        let date = clock::today(self.clock.as_ref())?;
        Ok(ArchiveContainer::new(self.layout.container_path(date)))
    }

    /// Runs one enumerate-decide-archive pass.
    ///
    /// Records are added to the container first and deleted from the live
    /// directory only after the container has been replaced on disk. A
    /// record that cannot be read stops the pass: the records stored before
    /// it are still deleted, then the error is returned. A failing delete
    /// also stops the pass; the records it did not reach are then both live
    /// and archived, and the next pass deletes them without storing them
    /// again.
    pub fn maybe_archive(&self) -> Result<ArchiveOutcome> {
        let _lock = if self.config.lock {
            match ArchiveLock::try_acquire(&self.config.live_path)? {
                Some(lock) => Some(lock),
                None => {
                    debug!(
                        "archive lock held elsewhere for {}",
                        self.config.live_path.display()
                    );
                    return Ok(ArchiveOutcome::Contended);
                }
            }
        } else {
            None
        };

        let records = self.live_records()?;
        let candidates = self.config.policy().candidates(&records);
        if candidates.is_empty() {
            debug!(
                "{} live records in {}, nothing to archive",
                records.len(),
                self.config.live_path.display()
            );
            return Ok(ArchiveOutcome::Idle {
                live: records.len(),
            });
        }

        let report = self.archive(candidates, records.len())?;
        Ok(ArchiveOutcome::Archived(report))
    }

    /// [`maybe_archive`](Self::maybe_archive) with failures handed to `sink`
    /// under `context` instead of returned.
    pub fn maybe_archive_reported(
        &self,
        context: &str,
        sink: &dyn ErrorSink,
    ) -> Option<ArchiveOutcome> {
        match self.maybe_archive() {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                sink.report(context, &err);
                None
            }
        }
    }

    fn archive(&self, candidates: &[ExceptionRecord], live_before: usize) -> Result<ArchiveReport> {
        ensure_dir(self.layout.root())?;
        let container = self.todays_container()?;
        let appended = container.append(candidates)?;

        for entry in &appended.entries {
            match fs::remove_file(&entry.source) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    warn!("{} vanished before it could be removed", entry.source.display());
                }
                Err(err) => return Err(err).io_at("remove", &entry.source),
            }
        }

        if let Some(err) = appended.stopped {
            warn!(
                "archived {} of {} exception records into {} before stopping",
                appended.entries.len(),
                candidates.len(),
                container.path().display()
            );
            return Err(err);
        }

        info!(
            "archived {} exception records into {}",
            appended.entries.len(),
            container.path().display()
        );
        Ok(ArchiveReport {
            container: container.path().to_path_buf(),
            live_before,
            entries: appended.entries,
        })
    }
}

fn ensure_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path).io_at("create_dir_all", path)
}
