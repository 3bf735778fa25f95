//! Retention policy evaluation.

use crate::enumerate::ExceptionRecord;

/// How many records stay live, and how much slack is tolerated before a
/// pass runs.
///
/// A pass fires only once the live count exceeds
/// `keep_count + archive_threshold`. When it does, every record beyond the
/// newest `keep_count` is archived, so the threshold delays a pass but never
/// changes how many records survive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub keep_count: usize,
    pub archive_threshold: usize,
}

impl RetentionPolicy {
    pub fn new(keep_count: usize, archive_threshold: usize) -> Self {
        Self {
            keep_count,
            archive_threshold,
        }
    }

    /// Largest live count that does not trigger a pass.
    pub fn trigger_level(&self) -> usize {
        self.keep_count.saturating_add(self.archive_threshold)
    }

    pub fn is_due(&self, live: usize) -> bool {
        live > self.trigger_level()
    }

    /// Records to archive from a newest-first listing. Empty unless a pass
    /// is due.
    pub fn candidates<'a>(&self, newest_first: &'a [ExceptionRecord]) -> &'a [ExceptionRecord] {
        if !self.is_due(newest_first.len()) {
            return &[];
        }
        &newest_first[self.keep_count..]
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_KEEP_COUNT,
            crate::config::DEFAULT_ARCHIVE_THRESHOLD,
        )
    }
}
