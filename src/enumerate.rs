use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{IoContext, Result};

/// One exception report on disk. Identity is the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionRecord {
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl ExceptionRecord {
    pub fn file_name(&self) -> &OsStr {
        self.path.file_name().unwrap_or_default()
    }
}

/// Lists plain files in `dir` whose names end with `extension`, newest
/// first by modification time. Equal times fall back to the file name,
/// descending.
///
/// Subdirectories and non-matching names are skipped. An entry that
/// vanishes between the directory read and its `stat` is skipped as well.
pub fn list_records(dir: &Path, extension: &str) -> Result<Vec<ExceptionRecord>> {
    let mut records = Vec::new();
    for entry in fs::read_dir(dir).io_at("read_dir", dir)? {
        let entry = entry.io_at("read_dir", dir)?;
        let path = entry.path();
        let name = entry.file_name();
        if !name.as_encoded_bytes().ends_with(extension.as_bytes()) {
            continue;
        }
        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(err).io_at("stat", &path),
        };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().io_at("mtime", &path)?;
        records.push(ExceptionRecord { path, modified });
    }

    records.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| b.file_name().cmp(a.file_name()))
    });
    Ok(records)
}
