use std::fs;
use std::path::{Path, PathBuf};

use time::{Date, Month};

use crate::error::{IoContext, Result};

pub const CONTAINER_EXTENSION: &str = "zip";

/// Naming of the per-day containers under an archive root:
/// `<root>/<prefix>-YYYYMMDD.zip`. Names sort chronologically as strings.
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    root: PathBuf,
    prefix: String,
}

/// A container found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerFile {
    pub date: Date,
    pub path: PathBuf,
}

impl ArchiveLayout {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn container_name(&self, date: Date) -> String {
        format!(
            "{}-{}.{CONTAINER_EXTENSION}",
            self.prefix,
            format_compact_date(date)
        )
    }

    pub fn container_path(&self, date: Date) -> PathBuf {
        self.root.join(self.container_name(date))
    }

    /// Inverse of [`container_name`](Self::container_name).
    pub fn parse_container_date(&self, name: &str) -> Option<Date> {
        let rest = name.strip_prefix(self.prefix.as_str())?.strip_prefix('-')?;
        let digits = rest.strip_suffix(CONTAINER_EXTENSION)?.strip_suffix('.')?;
        parse_compact_date(digits)
    }

    /// Containers under the root, oldest first. A missing root has none.
    pub fn containers(&self) -> Result<Vec<ContainerFile>> {
        let mut found = Vec::new();
        if !self.root.exists() {
            return Ok(found);
        }
        for entry in fs::read_dir(&self.root).io_at("read_dir", &self.root)? {
            let entry = entry.io_at("read_dir", &self.root)?;
            if !entry.file_type().io_at("stat", &entry.path())?.is_file() {
                continue;
            }
            let path = entry.path();
            let date = match path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| self.parse_container_date(name))
            {
                Some(date) => date,
                None => continue,
            };
            found.push(ContainerFile { date, path });
        }
        found.sort_by_key(|c| c.date);
        Ok(found)
    }
}

pub fn format_compact_date(date: Date) -> String {
    format!(
        "{:04}{:02}{:02}",
        date.year(),
        date.month() as u8,
        date.day()
    )
}

/// Parses `YYYYMMDD`.
pub fn parse_compact_date(value: &str) -> Option<Date> {
    if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year = value[0..4].parse::<i32>().ok()?;
    let month = Month::try_from(value[4..6].parse::<u8>().ok()?).ok()?;
    let day = value[6..8].parse::<u8>().ok()?;
    Date::from_calendar_date(year, month, day).ok()
}
