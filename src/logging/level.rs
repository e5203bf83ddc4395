//! Severity scale shared by all channels

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Severity of a message, and the threshold of a channel
///
/// Lower values are more severe. A channel with threshold `t` records a message of
/// severity `s` iff `s <= t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Severity {
    Crash = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
    /// For putting very large objects into log output
    Dump = 6,
}

impl Severity {
    /// Severity applied when nothing else is configured
    pub const DEFAULT: Severity = Severity::Info;

    pub const ALL: [Severity; 7] = [
        Severity::Crash,
        Severity::Error,
        Severity::Warn,
        Severity::Info,
        Severity::Debug,
        Severity::Trace,
        Severity::Dump,
    ];

    /// Fixed-width label used in formatted log lines
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Crash => "CRASH",
            Severity::Error => "ERROR",
            Severity::Warn => "WARN ",
            Severity::Info => "INFO ",
            Severity::Debug => "DEBUG",
            Severity::Trace => "TRACE",
            Severity::Dump => "DUMP ",
        }
    }

    /// Get the display name for this level
    pub fn name(&self) -> &'static str {
        self.label().trim_end()
    }

    pub fn value(&self) -> u8 {
        *self as u8
    }

    /// Convert an arbitrary integer, clamping it into the valid range
    pub fn clamp_from(value: i64) -> Self {
        Self::ALL[value.clamp(0, 6) as usize]
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<i64> for Severity {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Error> {
        if (0..=6).contains(&value) {
            Ok(Self::ALL[value as usize])
        } else {
            Err(Error::InvalidSeverity(value))
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Severity {
    type Err = Error;

    /// Accepts a level name in any case, or its numeric value
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(value) = s.parse::<i64>() {
            return Severity::try_from(value);
        }
        Severity::ALL
            .into_iter()
            .find(|level| level.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownSeverity(s.to_string()))
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.value())
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i64::deserialize(deserializer)?;
        Severity::try_from(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_five_wide() {
        for level in Severity::ALL {
            assert_eq!(level.label().len(), 5, "{:?}", level);
        }
        assert_eq!(Severity::Warn.label(), "WARN ");
        assert_eq!(Severity::Warn.name(), "WARN");
    }

    #[test]
    fn test_ordering_matches_values() {
        assert!(Severity::Crash < Severity::Error);
        assert!(Severity::Trace < Severity::Dump);
        assert_eq!(Severity::Debug.value(), 4);
        assert_eq!(Severity::default(), Severity::Info);
    }

    #[test]
    fn test_try_from_rejects_out_of_range() {
        assert_eq!(Severity::try_from(5).unwrap(), Severity::Trace);
        assert!(matches!(Severity::try_from(7), Err(Error::InvalidSeverity(7))));
        assert!(matches!(Severity::try_from(-1), Err(Error::InvalidSeverity(-1))));
    }

    #[test]
    fn test_clamp_from() {
        assert_eq!(Severity::clamp_from(-3), Severity::Crash);
        assert_eq!(Severity::clamp_from(42), Severity::Dump);
        assert_eq!(Severity::clamp_from(2), Severity::Warn);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("debug".parse::<Severity>().unwrap(), Severity::Debug);
        assert_eq!("WARN".parse::<Severity>().unwrap(), Severity::Warn);
        assert_eq!("6".parse::<Severity>().unwrap(), Severity::Dump);
        assert!(matches!("loud".parse::<Severity>(), Err(Error::UnknownSeverity(_))));
    }

    #[test]
    fn test_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Severity::Trace).unwrap(), "5");
        let parsed: Severity = serde_json::from_str("1").unwrap();
        assert_eq!(parsed, Severity::Error);
        assert!(serde_json::from_str::<Severity>("9").is_err());
    }
}
