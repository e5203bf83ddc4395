//! Error type for the log service

use std::path::PathBuf;

use thiserror::Error;

use crate::config::{categorize_io_error, DiskErrorKind};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Filesystem failure that is neither disk-full nor a permission problem
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Disk full - could not write {0:?}")]
    DiskFull(PathBuf),

    #[error("Permission denied writing to {0:?}. Check file permissions.")]
    PermissionDenied(PathBuf),

    /// The log file could not be opened when its channel was created
    #[error("Log file {0:?} is not open; output goes to stdout only")]
    SinkUnavailable(PathBuf),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    TomlRead(#[from] toml::de::Error),

    #[error(transparent)]
    TomlWrite(#[from] toml::ser::Error),

    /// Severity value outside 0..=6
    #[error("Invalid severity {0}, expected a value between 0 (CRASH) and 6 (DUMP)")]
    InvalidSeverity(i64),

    #[error("Unknown severity name '{0}'")]
    UnknownSeverity(String),

    /// Another live service in this process already owns this log directory
    ///
    /// The check is per log directory: services on different directories may coexist.
    #[error("A log service is already running for {0:?}")]
    RegistryInUse(PathBuf),
}

impl Error {
    /// Classify an I/O error raised while touching `path`
    pub fn from_io(e: std::io::Error, path: &std::path::Path, context: &str) -> Self {
        match categorize_io_error(&e) {
            DiskErrorKind::DiskFull => Error::DiskFull(path.to_path_buf()),
            DiskErrorKind::PermissionDenied => Error::PermissionDenied(path.to_path_buf()),
            DiskErrorKind::NotFound | DiskErrorKind::Other => Error::Io {
                context: format!("{} {}", context, path.display()),
                source: e,
            },
        }
    }
}
