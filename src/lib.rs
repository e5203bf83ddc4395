//! mpfb-log - log service for the MPFB human character editor
//!
//! Callers obtain a named channel from a `LogService` and write severity-tagged
//! messages to it. Each channel has its own level and log file; accepted messages are
//! also collected in a combined log, and per-channel levels survive restarts.

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::{Channel, ChannelFilter, LogService, Severity};
