use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::time::Duration;

use mpfb_log::config::Locations;
use mpfb_log::logging::{install_panic_hook, LogService, CRASH_CHANNEL};
use tempfile::TempDir;

/// The panic hook is process-global, so tests touching it run one at a time
static HOOK: Mutex<()> = Mutex::new(());

fn hook_lock() -> MutexGuard<'static, ()> {
    HOOK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn open(home: &Path) -> Arc<LogService> {
    Arc::new(
        LogService::builder(Locations::new(home))
            .echo_to_stdout(false)
            .open()
            .unwrap(),
    )
}

#[test]
fn test_panics_are_logged_and_handed_to_handler() {
    let _hook = hook_lock();
    let temp_dir = TempDir::new().unwrap();
    let service = open(temp_dir.path());

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    service.set_crash_handler(Box::new(move |report| {
        assert_eq!(report.message, "kaboom");
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    install_panic_hook(Arc::clone(&service));
    let result = std::panic::catch_unwind(|| panic!("kaboom"));
    let _ = std::panic::take_hook();

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let content = std::fs::read_to_string(service.channel(CRASH_CHANNEL).output_path()).unwrap();
    assert!(content.starts_with("[ERROR] Unhandled crash \n"));
    assert!(content.contains("at tests/panic_hook.rs:"));
    assert!(content.trim_end().ends_with("kaboom"));
}

#[test]
fn test_panic_while_registry_is_held_still_unwinds() {
    let _hook = hook_lock();
    let temp_dir = TempDir::new().unwrap();
    let service = open(temp_dir.path());
    install_panic_hook(Arc::clone(&service));

    let (tx, rx) = mpsc::channel();
    let worker = Arc::clone(&service);
    std::thread::spawn(move || {
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let _: () = worker.with_channels(|_| panic!("caller bug"));
        }));
        let _ = tx.send(result.is_err());
    });
    let unwound = rx.recv_timeout(Duration::from_secs(5));
    let _ = std::panic::take_hook();

    assert_eq!(unwound, Ok(true));
    let combined = std::fs::read_to_string(service.combined_log_path()).unwrap();
    assert!(combined.starts_with("[ERROR] mpfb.crash "));
    assert!(combined.contains("Unhandled crash"));
    assert!(combined.contains("caller bug"));

    // The registry is usable again once the panicking closure has unwound
    service.channel("after").warn("still logging");
    assert!(std::fs::read_to_string(service.combined_log_path())
        .unwrap()
        .contains("still logging"));
}

#[test]
fn test_panicking_handler_does_not_report_twice() {
    let _hook = hook_lock();
    let temp_dir = TempDir::new().unwrap();
    let service = open(temp_dir.path());

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    service.set_crash_handler(Box::new(move |report| {
        counter.fetch_add(1, Ordering::SeqCst);
        panic!("handler failed on {}", report.message);
    }));

    install_panic_hook(Arc::clone(&service));
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
        service.report_crash(&mpfb_log::logging::CrashReport::new("first"))
    }));
    let _ = std::panic::take_hook();

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let content = std::fs::read_to_string(service.channel(CRASH_CHANNEL).output_path()).unwrap();
    assert_eq!(content.matches("Unhandled crash").count(), 1);
    assert!(content.contains("first"));
}
