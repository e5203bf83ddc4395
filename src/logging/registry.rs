//! The log service: registry of named channels
//!
//! Owns the channel map, the default level and the persisted override table. One
//! service may be live per log directory; it is constructed explicitly by the host
//! integration layer and handed to whoever needs a channel.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, TryLockError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::channel::{self, Channel};
use super::crash::CrashHandler;
use super::level::Severity;
use super::sink::{EchoSink, FileSink};
use super::store::{LevelStore, LoadOutcome, DEFAULT_KEY};
use crate::config::Locations;
use crate::error::{Error, Result};

/// Sentinel category meaning "do not filter"
pub const NO_FILTER: &str = "ALL";

/// Log directories owned by a live service in this process. Only one service may
/// own a given directory; services on different directories are independent.
static CLAIMED_DIRS: Mutex<BTreeSet<PathBuf>> = Mutex::new(BTreeSet::new());

/// Exclusive ownership of a log directory, released on drop
#[derive(Debug)]
struct DirClaim(PathBuf);

impl DirClaim {
    fn acquire(dir: &Path) -> Result<Self> {
        let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        let mut claimed = CLAIMED_DIRS.lock().unwrap_or_else(|p| p.into_inner());
        if !claimed.insert(dir.clone()) {
            return Err(Error::RegistryInUse(dir));
        }
        Ok(Self(dir))
    }
}

impl Drop for DirClaim {
    fn drop(&mut self) {
        let mut claimed = CLAIMED_DIRS.lock().unwrap_or_else(|p| p.into_inner());
        claimed.remove(&self.0);
    }
}

/// Filter for `LogService::list_channel_names`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFilter {
    All,
    /// Only channels whose name starts with this prefix
    Prefix(String),
}

impl From<&str> for ChannelFilter {
    fn from(s: &str) -> Self {
        if s.is_empty() || s == NO_FILTER {
            ChannelFilter::All
        } else {
            ChannelFilter::Prefix(s.to_string())
        }
    }
}

impl ChannelFilter {
    fn matches(&self, name: &str) -> bool {
        match self {
            ChannelFilter::All => true,
            ChannelFilter::Prefix(prefix) => name.starts_with(prefix.as_str()),
        }
    }
}

/// Category of a channel: the part of its name before the first dot
pub fn category_of(name: &str) -> &str {
    name.split_once('.').map_or(name, |(category, _)| category)
}

#[derive(Debug)]
struct Registry {
    channels: HashMap<String, Arc<Channel>>,
    store: LevelStore,
}

/// Options for opening a `LogService`
#[derive(Debug, Clone)]
pub struct LogServiceBuilder {
    locations: Locations,
    echo: Option<Arc<EchoSink>>,
}

impl LogServiceBuilder {
    pub fn new(locations: Locations) -> Self {
        Self {
            locations,
            echo: Some(Arc::new(EchoSink::stdout())),
        }
    }

    /// Print every accepted message to stdout as well (default: on)
    pub fn echo_to_stdout(mut self, echo: bool) -> Self {
        self.echo = echo.then(|| Arc::new(EchoSink::stdout()));
        self
    }

    /// Send the console copy of every accepted message to `out` instead of stdout
    pub fn echo_to(mut self, out: impl std::io::Write + Send + 'static) -> Self {
        self.echo = Some(Arc::new(EchoSink::new(out)));
        self
    }

    /// Create directories, load the level table and truncate the combined log
    pub fn open(self) -> Result<LogService> {
        let locations = self.locations;
        locations.ensure_directories()?;

        let claim = DirClaim::acquire(&locations.logs_dir())?;

        tracing::debug!(
            "Initializing MPFB log service. Logs can be found in {}",
            locations.logs_dir().display()
        );

        let (store, outcome) = LevelStore::load_from(&locations.levels_file());
        if let LoadOutcome::Recovered(reason) = &outcome {
            tracing::warn!("Log levels were reset to defaults: {}", reason);
        }

        let combined = Arc::new(FileSink::create(locations.combined_log())?);

        Ok(LogService {
            locations,
            combined,
            echo: self.echo,
            started_at: Utc::now(),
            load_outcome: outcome,
            inner: Mutex::new(Registry {
                channels: HashMap::new(),
                store,
            }),
            crash_handler: RwLock::new(None),
            _claim: claim,
        })
    }
}

/// Registry of log channels and their levels
pub struct LogService {
    locations: Locations,
    combined: Arc<FileSink>,
    echo: Option<Arc<EchoSink>>,
    /// Initial timer origin of every channel
    started_at: DateTime<Utc>,
    load_outcome: LoadOutcome,
    inner: Mutex<Registry>,
    pub(super) crash_handler: RwLock<Option<CrashHandler>>,
    _claim: DirClaim,
}

impl std::fmt::Debug for LogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogService")
            .field("locations", &self.locations)
            .field("echo", &self.echo.is_some())
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

impl LogService {
    /// Open a service with default options
    pub fn open(locations: Locations) -> Result<Self> {
        LogServiceBuilder::new(locations).open()
    }

    pub fn builder(locations: Locations) -> LogServiceBuilder {
        LogServiceBuilder::new(locations)
    }

    fn inner(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get (or create) the channel with the given name
    ///
    /// A new channel starts at the default level, or at its stored override if one
    /// exists. Repeated calls return the same instance.
    pub fn channel(&self, name: &str) -> Arc<Channel> {
        let mut inner = self.inner();
        self.channel_in(&mut inner, name)
    }

    /// Like `channel`, but give up if the registry stays locked for `patience`
    ///
    /// Used where the current thread may itself hold the lock, such as a panic
    /// raised inside `with_channels`.
    pub(super) fn try_channel(&self, name: &str, patience: Duration) -> Option<Arc<Channel>> {
        let deadline = Instant::now() + patience;
        loop {
            match self.inner.try_lock() {
                Ok(mut inner) => return Some(self.channel_in(&mut inner, name)),
                Err(TryLockError::Poisoned(poisoned)) => {
                    let mut inner = poisoned.into_inner();
                    return Some(self.channel_in(&mut inner, name));
                }
                Err(TryLockError::WouldBlock) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(TryLockError::WouldBlock) => return None,
            }
        }
    }

    /// Write a long line for `name` to the console and the combined file only,
    /// without going through the channel map
    pub(super) fn record_unregistered(
        &self,
        name: &str,
        severity: Severity,
        message: &str,
        extra: &dyn Display,
    ) {
        let line = channel::long_line(name, severity, message, &format!(" {}", extra));
        if let Some(echo) = &self.echo {
            echo.write_line(&line);
        }
        if let Err(e) = self.combined.append_line(&line) {
            tracing::warn!(channel = %name, "Failed to record log message: {}", e);
        }
    }

    fn channel_in(&self, inner: &mut Registry, name: &str) -> Arc<Channel> {
        if let Some(channel) = inner.channels.get(name) {
            return Arc::clone(channel);
        }

        let output = FileSink::create_or_detached(self.locations.channel_log(name));
        let channel = Channel::create(
            name.to_string(),
            inner.store.default_level(),
            output,
            Arc::clone(&self.combined),
            self.echo.clone(),
            self.started_at,
        );
        if let Some(level) = inner.store.get(name) {
            channel.set_threshold(level);
        }

        let channel = Arc::new(channel);
        inner.channels.insert(name.to_string(), Arc::clone(&channel));
        channel
    }

    /// Level used by channels without an override
    pub fn default_threshold(&self) -> Severity {
        self.inner().store.default_level()
    }

    /// Change the default level and persist it
    ///
    /// Every channel without an override follows. The in-memory change stands even if
    /// writing the levels file fails.
    pub fn set_default_threshold(&self, level: Severity) -> Result<()> {
        let mut inner = self.inner();
        inner.store.set_default(level);
        for channel in inner.channels.values() {
            channel.apply_default(level);
        }
        inner.store.save()
    }

    /// Give one channel its own level and persist it
    ///
    /// The reserved name `"default"` changes the default level instead.
    pub fn set_channel_override(&self, name: &str, level: Severity) -> Result<()> {
        if name == DEFAULT_KEY {
            return self.set_default_threshold(level);
        }

        let channel = self.channel(name);
        let mut inner = self.inner();
        inner.store.set(name, level);
        channel.set_threshold(level);
        inner.store.save()
    }

    /// Remove a channel's override so it follows the default again
    pub fn clear_channel_override(&self, name: &str) -> Result<()> {
        let mut inner = self.inner();
        if inner.store.remove(name).is_none() {
            return Ok(());
        }
        let default = inner.store.default_level();
        if let Some(channel) = inner.channels.get(name) {
            channel.reset_to(default);
        }
        inner.store.save()
    }

    /// Reset all levels, including the default, to factory settings
    pub fn reset_all(&self) -> Result<()> {
        let mut inner = self.inner();
        inner.store.reset();
        for channel in inner.channels.values() {
            channel.reset_to(Severity::DEFAULT);
        }
        inner.store.save()
    }

    /// Sorted channel names, preceded by `"default"`
    pub fn list_channel_names(&self, filter: &ChannelFilter) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner()
            .channels
            .keys()
            .filter(|name| filter.matches(name))
            .cloned()
            .collect();
        names.sort();
        names.insert(0, DEFAULT_KEY.to_string());
        names
    }

    /// Channel categories in order of first appearance among sorted names,
    /// preceded by the `"ALL"` sentinel
    pub fn list_categories(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner().channels.keys().cloned().collect();
        names.sort();

        let mut categories = vec![NO_FILTER.to_string()];
        for name in &names {
            let category = category_of(name);
            if !categories[1..].iter().any(|c| c == category) {
                categories.push(category.to_string());
            }
        }
        categories
    }

    /// All channels, sorted by name
    pub fn channels(&self) -> Vec<Arc<Channel>> {
        let mut channels: Vec<Arc<Channel>> = self.inner().channels.values().cloned().collect();
        channels.sort_by(|a, b| a.name().cmp(b.name()));
        channels
    }

    /// Run `f` against the live channel map while holding the registry lock
    ///
    /// Do not call back into the service from `f`. A panic in `f` is still reported
    /// by the panic hook, through the combined file only.
    pub fn with_channels<R>(&self, f: impl FnOnce(&HashMap<String, Arc<Channel>>) -> R) -> R {
        f(&self.inner().channels)
    }

    /// Snapshot of the persisted level table, including `"default"`
    pub fn levels(&self) -> std::collections::BTreeMap<String, Severity> {
        self.inner().store.levels().clone()
    }

    /// How the levels file was found at startup
    pub fn load_outcome(&self) -> &LoadOutcome {
        &self.load_outcome
    }

    pub fn locations(&self) -> &Locations {
        &self.locations
    }

    pub fn combined_log_path(&self) -> &Path {
        self.combined.path()
    }

    pub fn levels_file_path(&self) -> PathBuf {
        self.locations.levels_file()
    }
}
