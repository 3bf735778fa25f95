use std::io;
use std::path::{Path, PathBuf};

use zip::result::ZipError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error during {op} on {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not add {entry} to archive {}: {source}", container.display())]
    ArchiveWrite {
        container: PathBuf,
        entry: String,
        #[source]
        source: ZipError,
    },
    #[error("could not finalize archive {}: {source}", container.display())]
    ArchiveFinish {
        container: PathBuf,
        #[source]
        source: ZipError,
    },
    #[error("unreadable archive {}: {source}", container.display())]
    Archive {
        container: PathBuf,
        #[source]
        source: ZipError,
    },
    #[error("invalid config: {0}")]
    Config(String),
    #[error("could not parse config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("timestamp out of calendar range: {0}")]
    InvalidTimestamp(u64),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attaches the failing operation and path to a bare `io::Error`.
pub(crate) trait IoContext<T> {
    fn io_at(self, op: &'static str, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_at(self, op: &'static str, path: &Path) -> Result<T> {
        self.map_err(|source| Error::Io {
            op,
            path: path.to_path_buf(),
            source,
        })
    }
}
