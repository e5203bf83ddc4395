//! Diagnostics of the log service itself
//!
//! Problems with log files or the levels file are reported through `tracing`, never
//! through the channels they concern. Hosts that already install a subscriber can skip
//! this; the CLI calls `init_diagnostics` once at startup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_DIAGNOSTICS_FILTER: &str = "mpfb_log=warn";

fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("mpfb_log=debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_DIAGNOSTICS_FILTER.into())
}

/// Install a stderr subscriber for the crate's own diagnostics
///
/// Returns false if a global subscriber was already set.
pub fn init_diagnostics(verbose: bool) -> bool {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(layer)
        .try_init()
        .is_ok()
}
