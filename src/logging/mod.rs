//! Channel-based logging for MPFB
//!
//! Provides named channels with their own levels and output files, a combined log of
//! everything accepted, and a persisted table of per-channel level overrides.

mod channel;
mod crash;
mod diagnostics;
mod level;
pub mod pretty;
mod registry;
mod sink;
mod store;

pub use channel::Channel;
pub use crash::{install_panic_hook, CrashHandler, CrashReport, CRASH_CHANNEL};
pub use diagnostics::{init_diagnostics, DEFAULT_DIAGNOSTICS_FILTER};
pub use level::Severity;
pub use registry::{category_of, ChannelFilter, LogService, LogServiceBuilder, NO_FILTER};
pub use sink::{EchoSink, FileSink};
pub use store::{LevelStore, LoadOutcome, DEFAULT_KEY};
