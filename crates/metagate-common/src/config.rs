//! Configuration types for metagate
//!
//! This module defines configuration structures used across components.

use crate::error::{Error, Result};
use crate::types::IndexState;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for a metagate node
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node configuration
    pub node: NodeConfig,
    /// Gateway (local metadata) configuration
    pub gateway: GatewayConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse a TOML document, filling missing sections with defaults
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::configuration(e.to_string()))
    }

    /// Load configuration from a file, or defaults if it does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}

/// Node identity and role configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node name (human-readable identifier)
    pub name: String,
    /// Data paths holding `_state` and `indices` directories
    pub data_paths: Vec<PathBuf>,
    /// Node may be elected coordinator
    pub master: bool,
    /// Node holds index data
    pub data: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "metagate-node".to_string(),
            data_paths: vec![PathBuf::from("/var/lib/metagate")],
            master: true,
            data: true,
        }
    }
}

/// Local metadata gateway configuration
///
/// Durations accept whole seconds (`0`, `30`) or a string with a unit
/// (`"500ms"`, `"30s"`, `"15m"`, `"2h"`, `"1d"`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// What to do with index data the cluster no longer knows about
    pub auto_import_dangled: AutoImportPolicy,
    /// Grace period before dangling data is deleted (0 = immediately)
    #[serde(with = "duration_format")]
    pub dangling_timeout: Duration,
    /// Bound for callers waiting on a delete acknowledgement
    #[serde(with = "duration_format")]
    pub delete_timeout: Duration,
    /// How long an accepted import may stay unconfirmed before it is resubmitted
    #[serde(with = "duration_format")]
    pub dangling_import_retry: Duration,
    /// Codec used for newly written state files
    pub format: StateFormat,
    /// Attempts to read local state at startup before giving up
    pub startup_read_attempts: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            auto_import_dangled: AutoImportPolicy::Yes,
            dangling_timeout: Duration::from_secs(2 * 60 * 60),
            delete_timeout: Duration::from_secs(30),
            dangling_import_retry: Duration::from_secs(30),
            format: StateFormat::Binary,
            startup_read_attempts: 3,
        }
    }
}

impl GatewayConfig {
    /// Grace period before dangling data is deleted
    #[must_use]
    pub const fn dangling_timeout(&self) -> Duration {
        self.dangling_timeout
    }

    /// Delete acknowledgement bound
    #[must_use]
    pub const fn delete_timeout(&self) -> Duration {
        self.delete_timeout
    }
}

/// Parse a duration: bare seconds or a number followed by `ms`, `s`, `m`, `h` or `d`
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| Error::configuration(format!("invalid duration: {s:?}")))?;

    let secs = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| Error::configuration(format!("duration out of range: {s:?}")))
    };

    match unit.trim() {
        "ms" => Ok(Duration::from_millis(value)),
        "" | "s" => secs(1),
        "m" => secs(60),
        "h" => secs(60 * 60),
        "d" => secs(24 * 60 * 60),
        other => Err(Error::configuration(format!(
            "unknown duration unit {other:?} in {s:?} (expected ms, s, m, h or d)"
        ))),
    }
}

/// Render a duration in the largest unit that divides it exactly
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_nanos() != 0 {
        return format!("{}ms", duration.as_millis());
    }
    let secs = duration.as_secs();
    match secs {
        0 => "0s".to_string(),
        s if s % 86_400 == 0 => format!("{}d", s / 86_400),
        s if s % 3_600 == 0 => format!("{}h", s / 3_600),
        s if s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{s}s"),
    }
}

mod duration_format {
    use super::{format_duration, parse_duration};
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        struct DurationVisitor;

        impl Visitor<'_> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("seconds or a duration string such as \"2h\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
                Ok(Duration::from_secs(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
                u64::try_from(v)
                    .map(Duration::from_secs)
                    .map_err(|_| E::custom(format!("negative duration: {v}")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
                parse_duration(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

/// Auto-import policy for dangling indices
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoImportPolicy {
    /// Never import; delete after the grace period
    No,
    /// Import as found on disk
    #[default]
    Yes,
    /// Import, but closed so the data is not served right away
    Closed,
}

impl AutoImportPolicy {
    /// Whether dangling indices are handed to the cluster
    #[must_use]
    pub const fn should_import(self) -> bool {
        matches!(self, Self::Yes | Self::Closed)
    }

    /// State to force onto imported records, if any
    #[must_use]
    pub const fn import_state_override(self) -> Option<IndexState> {
        match self {
            Self::Closed => Some(IndexState::Close),
            Self::No | Self::Yes => None,
        }
    }
}

impl std::fmt::Display for AutoImportPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::No => write!(f, "no"),
            Self::Yes => write!(f, "yes"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for AutoImportPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "no" => Ok(Self::No),
            "yes" => Ok(Self::Yes),
            "closed" => Ok(Self::Closed),
            other => Err(Error::configuration(format!(
                "unknown auto_import_dangled value: {other} (expected no, yes or closed)"
            ))),
        }
    }
}

/// Codec for state file payloads
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateFormat {
    /// bincode
    #[default]
    Binary,
    /// serde_json, human readable
    Json,
}

impl StateFormat {
    /// Tag stored in the state file header
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Binary => 1,
            Self::Json => 2,
        }
    }

    /// Resolve a header tag
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Binary),
            2 => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
