//! Persistence of channel level overrides
//!
//! The levels file is a flat JSON object mapping channel names, plus the reserved
//! `"default"` key, to integer severities. It is read once at startup and rewritten
//! in full on every change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::level::Severity;
use crate::error::{Error, Result};

/// Reserved key holding the default level
pub const DEFAULT_KEY: &str = "default";

/// What happened while loading the levels file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// An existing file was read
    Loaded,
    /// No file existed; a template was created
    Created,
    /// The file could not be used and was replaced by a template
    Recovered(String),
}

/// Backup a corrupted file by renaming it with a .backup extension
fn backup_corrupted_file(path: &Path) {
    let backup_path = path.with_extension("json.backup");
    if let Err(e) = std::fs::rename(path, &backup_path) {
        tracing::warn!(
            "Failed to backup corrupted file {} to {}: {}",
            path.display(),
            backup_path.display(),
            e
        );
    } else {
        tracing::info!(
            "Corrupted log levels file backed up to {}",
            backup_path.display()
        );
    }
}

fn template() -> BTreeMap<String, Severity> {
    let mut levels = BTreeMap::new();
    levels.insert(DEFAULT_KEY.to_string(), Severity::DEFAULT);
    levels
}

/// Store for the persisted level table
#[derive(Debug, Clone)]
pub struct LevelStore {
    levels: BTreeMap<String, Severity>,
    path: PathBuf,
}

impl LevelStore {
    /// Create a store holding only the default level, without touching disk
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            levels: template(),
            path,
        }
    }

    /// Load the levels file, creating or repairing it as needed
    ///
    /// Never fails: a missing file is replaced by a template, and an unreadable or
    /// malformed one is backed up and replaced. Failing to write the template only
    /// produces a warning; the in-memory table is still usable.
    pub fn load_from(path: &Path) -> (Self, LoadOutcome) {
        let mut store = Self::with_path(path.to_path_buf());

        if !path.exists() {
            tracing::info!("Log config does not exist. Creating empty template.");
            store.save_or_warn();
            return (store, LoadOutcome::Created);
        }

        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                serde_json::from_str::<BTreeMap<String, i64>>(&content).map_err(|e| e.to_string())
            });

        let raw = match parsed {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!("Log levels file {} is unusable: {}", path.display(), e);
                backup_corrupted_file(path);
                store.save_or_warn();
                return (store, LoadOutcome::Recovered(e));
            }
        };

        for (name, value) in raw {
            let level = Severity::clamp_from(value);
            if i64::from(level.value()) != value {
                tracing::warn!(
                    "Level {} for '{}' is out of range, using {}",
                    value,
                    name,
                    level
                );
            }
            store.levels.insert(name, level);
        }

        (store, LoadOutcome::Loaded)
    }

    fn save_or_warn(&self) {
        if let Err(e) = self.save() {
            tracing::warn!("Could not write log levels file: {}", e);
        }
    }

    /// Overwrite the levels file with the current table
    pub fn save(&self) -> Result<()> {
        tracing::debug!("Will rewrite log config {}", self.path.display());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::from_io(e, parent, "Failed to create directory"))?;
        }

        let content = serde_json::to_string_pretty(&self.levels)?;
        std::fs::write(&self.path, content)
            .map_err(|e| Error::from_io(e, &self.path, "Failed to write log levels file"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn default_level(&self) -> Severity {
        self.levels
            .get(DEFAULT_KEY)
            .copied()
            .unwrap_or(Severity::DEFAULT)
    }

    pub fn set_default(&mut self, level: Severity) {
        self.levels.insert(DEFAULT_KEY.to_string(), level);
    }

    /// Get the stored override for a channel
    pub fn get(&self, name: &str) -> Option<Severity> {
        if name == DEFAULT_KEY {
            return None;
        }
        self.levels.get(name).copied()
    }

    /// Record an override. The reserved key updates the default instead.
    pub fn set(&mut self, name: &str, level: Severity) {
        self.levels.insert(name.to_string(), level);
    }

    /// Remove an override, returning it. The default cannot be removed.
    pub fn remove(&mut self, name: &str) -> Option<Severity> {
        if name == DEFAULT_KEY {
            return None;
        }
        self.levels.remove(name)
    }

    /// Forget all overrides and restore the default level
    pub fn reset(&mut self) {
        self.levels = template();
    }

    /// All per-channel overrides, sorted by channel name
    pub fn overrides(&self) -> impl Iterator<Item = (&str, Severity)> {
        self.levels
            .iter()
            .filter(|(name, _)| name.as_str() != DEFAULT_KEY)
            .map(|(name, level)| (name.as_str(), *level))
    }

    /// The full table, including the default
    pub fn levels(&self) -> &BTreeMap<String, Severity> {
        &self.levels
    }
}
