//! Named log channels
//!
//! A channel filters messages against its own threshold and records every accepted
//! message twice: a short line in its private file and a long line, prefixed with the
//! channel name, in the combined file shared by all channels.

use std::fmt::Display;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::level::Severity;
use super::pretty::{self, PrettyOptions};
use super::sink::{EchoSink, FileSink};
use crate::error::Result;

/// Width the channel name column is padded to in the combined file
const JUSTIFICATION: usize = 40;

/// Line written to the combined file: label, dot-padded channel name, message
pub(super) fn long_line(name: &str, severity: Severity, message: &str, extra: &str) -> String {
    let location = format!("{:.<width$}", format!("{} ", name), width = JUSTIFICATION);
    format!("[{}] {}: {}{}", severity.label(), location, message, extra)
}

#[derive(Debug)]
struct ChannelState {
    threshold: Severity,
    /// Set once an explicit level was applied; bulk default changes skip the channel
    overridden: bool,
    timer_origin: DateTime<Utc>,
}

/// A named, independently thresholded log sink
#[derive(Debug)]
pub struct Channel {
    name: String,
    output: FileSink,
    combined: Arc<FileSink>,
    echo: Option<Arc<EchoSink>>,
    state: Mutex<ChannelState>,
    write_failures: AtomicU64,
}

impl Channel {
    /// Create a channel, emptying its private output file
    pub(crate) fn create(
        name: String,
        threshold: Severity,
        output: FileSink,
        combined: Arc<FileSink>,
        echo: Option<Arc<EchoSink>>,
        timer_origin: DateTime<Utc>,
    ) -> Self {
        Self {
            name,
            output,
            combined,
            echo,
            state: Mutex::new(ChannelState {
                threshold,
                overridden: false,
                timer_origin,
            }),
            write_failures: AtomicU64::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of this channel's private log file
    pub fn output_path(&self) -> &Path {
        self.output.path()
    }

    /// Highest severity value this channel records
    pub fn threshold(&self) -> Severity {
        self.state().threshold
    }

    /// Whether an explicit level has been applied to this channel
    pub fn is_overridden(&self) -> bool {
        self.state().overridden
    }

    /// Set the level for this channel only
    ///
    /// The channel is marked overridden, so later default changes leave it alone. This
    /// is not persisted; use `LogService::set_channel_override` for that.
    pub fn set_threshold(&self, level: Severity) {
        let mut state = self.state();
        state.threshold = level;
        state.overridden = true;
    }

    /// Apply a new default level unless the channel is overridden
    pub(crate) fn apply_default(&self, level: Severity) -> bool {
        let mut state = self.state();
        if state.overridden {
            return false;
        }
        state.threshold = level;
        true
    }

    /// Drop any override and go back to `level`
    pub(crate) fn reset_to(&self, level: Severity) {
        let mut state = self.state();
        state.threshold = level;
        state.overridden = false;
    }

    /// Check if debug logging is enabled for this channel
    pub fn debug_enabled(&self) -> bool {
        self.threshold() >= Severity::Debug
    }

    /// Number of accepted messages that could not be written to disk
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    /// Record a message if `severity` passes the threshold
    ///
    /// Returns whether the message was accepted. The long line is echoed to stdout
    /// (when enabled) before any file is touched. Both files are always attempted;
    /// the first write failure is returned.
    pub fn emit(&self, severity: Severity, message: &str, extra: Option<&dyn Display>) -> Result<bool> {
        if severity > self.threshold() {
            return Ok(false);
        }

        let extra = extra.map(|e| format!(" {}", e)).unwrap_or_default();
        let long_line = long_line(&self.name, severity, message, &extra);
        let short_line = format!("[{}] {}{}", severity.label(), message, extra);

        if let Some(echo) = &self.echo {
            echo.write_line(&long_line);
        }

        let private = self.output.append_line(&short_line);
        let combined = self.combined.append_line(&long_line);
        private.and(combined)?;

        Ok(true)
    }

    fn log(&self, severity: Severity, message: &str, extra: Option<&dyn Display>) -> bool {
        match self.emit(severity, message, extra) {
            Ok(accepted) => accepted,
            Err(e) => {
                self.write_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(channel = %self.name, "Failed to record log message: {}", e);
                true
            }
        }
    }

    /// Report a crash. Always recorded, whatever the level.
    pub fn crash(&self, message: &str) -> bool {
        self.log(Severity::Crash, message, None)
    }

    pub fn crash_with(&self, message: &str, extra: impl Display) -> bool {
        self.log(Severity::Crash, message, Some(&extra))
    }

    /// Report an error, if the level is at least 1
    pub fn error(&self, message: &str) -> bool {
        self.log(Severity::Error, message, None)
    }

    pub fn error_with(&self, message: &str, extra: impl Display) -> bool {
        self.log(Severity::Error, message, Some(&extra))
    }

    /// Report a warning, if the level is at least 2
    pub fn warn(&self, message: &str) -> bool {
        self.log(Severity::Warn, message, None)
    }

    pub fn warn_with(&self, message: &str, extra: impl Display) -> bool {
        self.log(Severity::Warn, message, Some(&extra))
    }

    /// Report information, if the level is at least 3
    pub fn info(&self, message: &str) -> bool {
        self.log(Severity::Info, message, None)
    }

    pub fn info_with(&self, message: &str, extra: impl Display) -> bool {
        self.log(Severity::Info, message, Some(&extra))
    }

    /// Report a debug message, if the level is at least 4
    pub fn debug(&self, message: &str) -> bool {
        self.log(Severity::Debug, message, None)
    }

    pub fn debug_with(&self, message: &str, extra: impl Display) -> bool {
        self.log(Severity::Debug, message, Some(&extra))
    }

    /// Report a trace message, if the level is at least 5
    pub fn trace(&self, message: &str) -> bool {
        self.log(Severity::Trace, message, None)
    }

    pub fn trace_with(&self, message: &str, extra: impl Display) -> bool {
        self.log(Severity::Trace, message, Some(&extra))
    }

    /// Dump a large data structure, only when the level is above trace
    ///
    /// Values that serialize to a string are written verbatim, anything else is
    /// pretty printed.
    pub fn dump<T: Serialize + ?Sized>(&self, message: &str, value: &T) -> bool {
        if self.threshold() <= Severity::Trace {
            return false;
        }

        let text = match serde_json::to_value(value) {
            Ok(Value::String(s)) => s,
            Ok(v) => pretty::render(&v, &PrettyOptions::default()),
            Err(e) => format!("<unserializable value: {}>", e),
        };

        self.log(Severity::Dump, message, Some(&format!("\n{}", text)))
    }

    /// Report that the calling function was entered, at trace level
    #[track_caller]
    pub fn enter(&self) -> bool {
        if self.threshold() < Severity::Trace {
            return false;
        }
        let caller = std::panic::Location::caller();
        let message = format!("Now entering {}:{}", caller.file(), caller.line());
        self.log(Severity::Trace, &message, None)
    }

    /// Like `enter`, with an explicit function label
    #[track_caller]
    pub fn enter_named(&self, function: &str) -> bool {
        if self.threshold() < Severity::Trace {
            return false;
        }
        let caller = std::panic::Location::caller();
        let message = format!("Now entering {}():{}", function, caller.line());
        self.log(Severity::Trace, &message, None)
    }

    /// Milliseconds since the timer was last reset
    pub fn elapsed_millis(&self) -> i64 {
        (Utc::now() - self.state().timer_origin).num_milliseconds()
    }

    /// Report the elapsed time at debug level
    pub fn time(&self, message: &str) -> bool {
        let elapsed = self.elapsed_millis();
        self.log(Severity::Debug, message, Some(&elapsed))
    }

    pub fn reset_timer(&self) {
        self.state().timer_origin = Utc::now();
    }
}
