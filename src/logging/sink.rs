//! Append-only log files
//!
//! Every sink truncates its file when created and only appends afterwards. The file
//! handle sits behind a mutex so concurrent writers never interleave partial lines.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};

/// A text file receiving one line per accepted message
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    /// None when the file could not be opened
    file: Mutex<Option<File>>,
}

impl FileSink {
    /// Create (or empty) the file at `path` and keep it open for appending
    pub fn create(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::from_io(e, &path, "Failed to open log file"))?;

        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    /// Like `create`, but degrade to a sink whose writes all fail instead of erroring
    pub fn create_or_detached(path: PathBuf) -> Self {
        match Self::create(path.clone()) {
            Ok(sink) => sink,
            Err(e) => {
                tracing::warn!("{}; messages for it go to stdout only", e);
                Self {
                    path,
                    file: Mutex::new(None),
                }
            }
        }
    }

    /// Whether the file is open
    pub fn is_attached(&self) -> bool {
        self.file
            .lock()
            .map(|file| file.is_some())
            .unwrap_or(false)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `line` followed by a newline
    pub fn append_line(&self, line: &str) -> Result<()> {
        let mut guard = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(file) = guard.as_mut() else {
            return Err(Error::SinkUnavailable(self.path.clone()));
        };

        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');

        file.write_all(buf.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| Error::from_io(e, &self.path, "Failed to append to"))
    }
}

/// Console copy of the combined log, normally stdout
pub struct EchoSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl EchoSink {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// Write `line` and a newline. Failures are ignored.
    pub fn write_line(&self, line: &str) {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = writeln!(out, "{}", line).and_then(|_| out.flush());
    }
}

impl fmt::Debug for EchoSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EchoSink").finish_non_exhaustive()
    }
}
