//! Configuration and directory locations for the MPFB log service

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Preference key holding an alternative user data directory
pub const USER_DATA_KEY: &str = "mpfb_user_data";

/// Preference key enabling the crash hook
pub const EXCEPTHOOK_KEY: &str = "mpfb_excepthook";

const PREFERENCES_FILE: &str = "mpfb.toml";

/// Source of string-valued preferences
///
/// The host integration layer supplies its own implementation; the log service only
/// needs to look up a handful of keys at startup.
pub trait ConfigProvider {
    /// Look up a preference, returning None if it is not set
    fn get_string(&self, key: &str) -> Option<String>;
}

impl ConfigProvider for HashMap<String, String> {
    fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Categories of disk errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskErrorKind {
    /// Disk is full or quota exceeded
    DiskFull,
    /// Permission denied (read or write)
    PermissionDenied,
    /// File or directory not found
    NotFound,
    /// Other IO error
    Other,
}

/// Categorize an IO error
pub fn categorize_io_error(e: &std::io::Error) -> DiskErrorKind {
    use std::io::ErrorKind;

    match e.kind() {
        ErrorKind::StorageFull | ErrorKind::WriteZero => DiskErrorKind::DiskFull,
        ErrorKind::PermissionDenied => DiskErrorKind::PermissionDenied,
        ErrorKind::NotFound => DiskErrorKind::NotFound,
        _ => {
            #[cfg(unix)]
            {
                if let Some(os_error) = e.raw_os_error() {
                    // ENOSPC = 28, EDQUOT = 122 (Linux) / 69 (macOS)
                    if os_error == 28 || os_error == 122 || os_error == 69 {
                        return DiskErrorKind::DiskFull;
                    }
                    // EACCES
                    if os_error == 13 {
                        return DiskErrorKind::PermissionDenied;
                    }
                }
            }
            DiskErrorKind::Other
        }
    }
}

/// Add-on preferences relevant to logging
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Preferences {
    /// Alternative user data directory. Empty or missing means "use the host default".
    #[serde(default)]
    pub user_data: Option<String>,

    /// Route unhandled crashes into the log service
    #[serde(default)]
    pub excepthook: bool,
}

impl Preferences {
    /// Load preferences from a TOML file, or return defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::from_io(e, path, "Failed to read"))?;
        Ok(toml::from_str(&content)?)
    }

    /// Save preferences to a TOML file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::from_io(e, parent, "Failed to create"))?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| Error::from_io(e, path, "Failed to write"))
    }

    /// Get the path to the preferences file below a host user directory
    pub fn file_path(host_user_dir: &Path) -> PathBuf {
        host_user_dir.join("mpfb").join(PREFERENCES_FILE)
    }
}

impl ConfigProvider for Preferences {
    fn get_string(&self, key: &str) -> Option<String> {
        match key {
            USER_DATA_KEY => self.user_data.clone(),
            EXCEPTHOOK_KEY => Some(self.excepthook.to_string()),
            _ => None,
        }
    }
}

/// Check whether a boolean preference is switched on
pub fn is_enabled(provider: &dyn ConfigProvider, key: &str) -> bool {
    matches!(
        provider.get_string(key).as_deref().map(str::trim),
        Some("true" | "1" | "yes" | "on")
    )
}

/// Directories and files used by the log service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locations {
    home: PathBuf,
}

impl Locations {
    /// Use `home` directly as the MPFB user data directory
    ///
    /// Relative paths are made absolute against the current directory, so every
    /// derived log path is absolute.
    pub fn new(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let home = std::path::absolute(&home).unwrap_or(home);
        Self { home }
    }

    /// Resolve the MPFB user data directory
    ///
    /// The `mpfb_user_data` preference wins when it is set and non-empty, otherwise the
    /// data lives in an `mpfb` directory below the host's user resource directory.
    pub fn resolve(provider: &dyn ConfigProvider, host_user_dir: &Path) -> Self {
        match provider.get_string(USER_DATA_KEY) {
            Some(dir) if !dir.trim().is_empty() => {
                Self::new(shellexpand::tilde(dir.trim()).into_owned())
            }
            _ => Self::new(host_user_dir.join("mpfb")),
        }
    }

    /// Best guess at the host's user resource directory
    /// Falls back to ./.mpfb-host if no data directory can be determined
    pub fn default_host_user_dir() -> PathBuf {
        dirs::data_dir().unwrap_or_else(|| {
            tracing::warn!("Could not determine user data directory, using current directory");
            PathBuf::from(".mpfb-host")
        })
    }

    /// The MPFB user data directory
    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home.join("logs")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.home.join("config")
    }

    /// File aggregating every accepted message
    pub fn combined_log(&self) -> PathBuf {
        self.logs_dir().join("combined.txt")
    }

    /// Persisted level overrides
    pub fn levels_file(&self) -> PathBuf {
        self.config_dir().join("log_levels.json")
    }

    /// Private output file of a channel
    pub fn channel_log(&self, name: &str) -> PathBuf {
        self.logs_dir().join(format!("separated.{}.txt", name))
    }

    /// Ensure the log and config directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [self.logs_dir(), self.config_dir()] {
            std::fs::create_dir_all(&dir)
                .map_err(|e| Error::from_io(e, &dir, "Failed to create directory"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_uses_host_dir_without_preference() {
        let prefs = Preferences::default();
        let locations = Locations::resolve(&prefs, Path::new("/host/user"));
        assert_eq!(locations.home(), Path::new("/host/user/mpfb"));
        assert_eq!(
            locations.levels_file(),
            PathBuf::from("/host/user/mpfb/config/log_levels.json")
        );
        assert_eq!(
            locations.combined_log(),
            PathBuf::from("/host/user/mpfb/logs/combined.txt")
        );
    }

    #[test]
    fn test_resolve_prefers_user_data_preference() {
        let mut map = HashMap::new();
        map.insert(USER_DATA_KEY.to_string(), "/data/mpfb".to_string());
        let locations = Locations::resolve(&map, Path::new("/host/user"));
        assert_eq!(locations.home(), Path::new("/data/mpfb"));
    }

    #[test]
    fn test_resolve_ignores_blank_preference() {
        let prefs = Preferences {
            user_data: Some("   ".to_string()),
            excepthook: false,
        };
        let locations = Locations::resolve(&prefs, Path::new("/host/user"));
        assert_eq!(locations.home(), Path::new("/host/user/mpfb"));
    }

    #[test]
    fn test_channel_log_name() {
        let locations = Locations::new("/m");
        assert_eq!(
            locations.channel_log("mpfb.init"),
            PathBuf::from("/m/logs/separated.mpfb.init.txt")
        );
    }

    #[test]
    fn test_relative_home_becomes_absolute() {
        let locations = Locations::new("rel/mpfb");
        assert!(locations.home().is_absolute());
        assert!(locations.home().ends_with("rel/mpfb"));
        assert!(locations.channel_log("net").is_absolute());
        assert!(locations.combined_log().is_absolute());
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let locations = Locations::new(temp_dir.path().join("mpfb"));
        locations.ensure_directories().unwrap();
        assert!(locations.logs_dir().is_dir());
        assert!(locations.config_dir().is_dir());
    }

    #[test]
    fn test_preferences_roundtrip_and_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = Preferences::file_path(temp_dir.path());

        assert_eq!(Preferences::load_from(&path).unwrap(), Preferences::default());

        let prefs = Preferences {
            user_data: Some("~/mpfb-data".to_string()),
            excepthook: true,
        };
        prefs.save_to(&path).unwrap();
        assert_eq!(Preferences::load_from(&path).unwrap(), prefs);
    }

    #[test]
    fn test_is_enabled() {
        let prefs = Preferences {
            user_data: None,
            excepthook: true,
        };
        assert!(is_enabled(&prefs, EXCEPTHOOK_KEY));
        assert!(!is_enabled(&Preferences::default(), EXCEPTHOOK_KEY));
        assert!(!is_enabled(&prefs, "unknown"));
    }

    #[test]
    fn test_categorize_permission_denied() {
        let e = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(categorize_io_error(&e), DiskErrorKind::PermissionDenied);
    }
}
