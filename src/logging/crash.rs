//! Crash reporting
//!
//! Unhandled failures are written to the `mpfb.crash` channel and then passed on to
//! an optional handler registered on the service. Routing panics here is opt-in via
//! `install_panic_hook`.

use std::backtrace::Backtrace;
use std::cell::Cell;
use std::fmt;
use std::panic::PanicHookInfo;
use std::sync::Arc;
use std::time::Duration;

use super::level::Severity;
use super::registry::LogService;

/// Channel receiving crash reports
pub const CRASH_CHANNEL: &str = "mpfb.crash";

const CRASH_MESSAGE: &str = "Unhandled crash";

/// How long a crash report waits for the registry before bypassing it
const REGISTRY_PATIENCE: Duration = Duration::from_millis(100);

thread_local! {
    static REPORTING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as reporting a crash until dropped
struct ReportingGuard;

impl ReportingGuard {
    /// None if this thread is already reporting
    fn enter() -> Option<Self> {
        if REPORTING.with(|reporting| reporting.replace(true)) {
            None
        } else {
            Some(ReportingGuard)
        }
    }
}

impl Drop for ReportingGuard {
    fn drop(&mut self) {
        REPORTING.with(|reporting| reporting.set(false));
    }
}

/// Callback invoked after a crash has been logged
pub type CrashHandler = Box<dyn Fn(&CrashReport) + Send + Sync>;

/// Structured description of an unhandled failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashReport {
    pub message: String,
    /// `file:line` where the failure was raised, if known
    pub location: Option<String>,
    pub backtrace: String,
}

impl CrashReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            backtrace: String::new(),
        }
    }

    /// Build a report from a panic, capturing a backtrace
    pub fn from_panic(info: &PanicHookInfo<'_>) -> Self {
        let payload = info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        };

        Self {
            message,
            location: info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line())),
            backtrace: Backtrace::force_capture().to_string(),
        }
    }
}

impl fmt::Display for CrashReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        if let Some(location) = &self.location {
            writeln!(f, "at {}", location)?;
        }
        if !self.backtrace.is_empty() {
            writeln!(f, "{}", self.backtrace.trim_end())?;
        }
        writeln!(f, "{}", self.message)
    }
}

impl LogService {
    /// Register the callback run after every crash report
    pub fn set_crash_handler(&self, handler: CrashHandler) {
        let mut slot = self
            .crash_handler
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(handler);
    }

    /// Log a crash at error level and hand it to the registered handler
    ///
    /// A crash raised while this thread is already reporting one (a panicking
    /// handler, say) is only traced. If the registry is held, the report goes to the
    /// console and the combined file without the crash channel.
    pub fn report_crash(&self, report: &CrashReport) {
        let Some(_guard) = ReportingGuard::enter() else {
            tracing::warn!("Crash while reporting a crash: {}", report.message);
            return;
        };

        match self.try_channel(CRASH_CHANNEL, REGISTRY_PATIENCE) {
            Some(channel) => {
                channel.error_with(CRASH_MESSAGE, report);
            }
            None => self.record_unregistered(CRASH_CHANNEL, Severity::Error, CRASH_MESSAGE, report),
        }

        let slot = self
            .crash_handler
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handler) = slot.as_ref() {
            handler(report);
        }
    }
}

/// Route panics through `service.report_crash`, then to the previous panic hook
pub fn install_panic_hook(service: Arc<LogService>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let report = CrashReport::from_panic(info);
        service.report_crash(&report);
        previous(info);
    }));
    tracing::warn!(
        "Overriding the global panic hook. You should probably disable this when not needing it."
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Locations;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[test]
    fn test_report_format() {
        let report = CrashReport {
            message: "index out of bounds".to_string(),
            location: Some("src/mesh.rs:10".to_string()),
            backtrace: String::new(),
        };
        assert_eq!(report.to_string(), "\nat src/mesh.rs:10\nindex out of bounds\n");
    }

    #[test]
    fn test_report_crash_logs_and_calls_handler() {
        let temp_dir = TempDir::new().unwrap();
        let service = LogService::builder(Locations::new(temp_dir.path()))
            .echo_to_stdout(false)
            .open()
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        service.set_crash_handler(Box::new(move |report| {
            sink.lock().unwrap().push(report.message.clone());
        }));

        service.report_crash(&CrashReport::new("disk on fire"));

        assert_eq!(*seen.lock().unwrap(), vec!["disk on fire".to_string()]);
        let content =
            std::fs::read_to_string(service.channel(CRASH_CHANNEL).output_path()).unwrap();
        assert_eq!(content, "[ERROR] Unhandled crash \ndisk on fire\n\n");
    }

    #[test]
    fn test_nested_report_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let service = Arc::new(
            LogService::builder(Locations::new(temp_dir.path()))
                .echo_to_stdout(false)
                .open()
                .unwrap(),
        );

        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let inner = Arc::downgrade(&service);
        service.set_crash_handler(Box::new(move |_| {
            *counter.lock().unwrap() += 1;
            if let Some(service) = inner.upgrade() {
                service.report_crash(&CrashReport::new("from the handler"));
            }
        }));

        service.report_crash(&CrashReport::new("outer"));

        assert_eq!(*calls.lock().unwrap(), 1);
        let content =
            std::fs::read_to_string(service.channel(CRASH_CHANNEL).output_path()).unwrap();
        assert_eq!(content, "[ERROR] Unhandled crash \nouter\n\n");
    }

    #[test]
    fn test_report_bypasses_held_registry() {
        let temp_dir = TempDir::new().unwrap();
        let service = LogService::builder(Locations::new(temp_dir.path()))
            .echo_to_stdout(false)
            .open()
            .unwrap();

        service.with_channels(|_| service.report_crash(&CrashReport::new("inside")));

        let combined = std::fs::read_to_string(service.combined_log_path()).unwrap();
        assert!(combined.starts_with("[ERROR] mpfb.crash ......"));
        assert!(combined.contains(": Unhandled crash \ninside\n"));
        service.with_channels(|channels| assert!(!channels.contains_key(CRASH_CHANNEL)));
    }
}
