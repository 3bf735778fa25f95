use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, IoContext, Result};
use crate::policy::RetentionPolicy;

pub const DEFAULT_KEEP_COUNT: usize = 50;
pub const DEFAULT_ARCHIVE_THRESHOLD: usize = 10;
pub const DEFAULT_EXTENSION: &str = ".txt";
pub const DEFAULT_CONTAINER_PREFIX: &str = "exceptions";

/// Settings for one live directory and its archive root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiverConfig {
    /// Directory the record writer drops exception reports into.
    pub live_path: PathBuf,
    /// Where daily containers go. Falls back to `live_path`.
    #[serde(default)]
    pub archive_path: Option<PathBuf>,
    /// Newest records that always stay live.
    #[serde(default = "default_keep_count")]
    pub keep_count: usize,
    /// Slack above `keep_count` before a pass is triggered.
    #[serde(default = "default_archive_threshold")]
    pub archive_threshold: usize,
    /// File name suffix that marks a record.
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default = "default_container_prefix")]
    pub container_prefix: String,
    /// Take an advisory lock in the live directory for each pass.
    #[serde(default)]
    pub lock: bool,
}

fn default_keep_count() -> usize {
    DEFAULT_KEEP_COUNT
}

fn default_archive_threshold() -> usize {
    DEFAULT_ARCHIVE_THRESHOLD
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

fn default_container_prefix() -> String {
    DEFAULT_CONTAINER_PREFIX.to_string()
}

impl ArchiverConfig {
    pub fn new(live_path: impl Into<PathBuf>) -> Self {
        Self {
            live_path: live_path.into(),
            archive_path: None,
            keep_count: DEFAULT_KEEP_COUNT,
            archive_threshold: DEFAULT_ARCHIVE_THRESHOLD,
            extension: default_extension(),
            container_prefix: default_container_prefix(),
            lock: false,
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).io_at("read config", path)?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.live_path.as_os_str().is_empty() {
            return Err(Error::Config("live_path is empty".to_string()));
        }
        if self.extension.is_empty() {
            return Err(Error::Config("extension is empty".to_string()));
        }
        if [".zip", ".tmp", ".lock"]
            .iter()
            .any(|reserved| self.extension.ends_with(reserved))
        {
            return Err(Error::Config(format!(
                "extension {} would match archive files",
                self.extension
            )));
        }
        if self.container_prefix.is_empty() {
            return Err(Error::Config("container_prefix is empty".to_string()));
        }
        if self
            .container_prefix
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0')
        {
            return Err(Error::Config(format!(
                "container_prefix contains a path separator: {}",
                self.container_prefix
            )));
        }
        Ok(())
    }

    pub fn archive_root(&self) -> &Path {
        self.archive_path.as_deref().unwrap_or(&self.live_path)
    }

    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.keep_count, self.archive_threshold)
    }
}
