//! Writer configuration types and YAML loading.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use snafu::prelude::*;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, ReadFileSnafu, YamlParseSnafu};

/// Byte size constants (binary/IEC units).
pub const KB: usize = 1024;
pub const MB: usize = 1024 * KB;

/// Default buffer size for staging file streams.
pub const DEFAULT_BUFFER_SIZE: usize = 4 * KB;

/// Unix-style permission mode bits.
///
/// Serialized as an octal string ("644") in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsPermission(pub u32);

impl FsPermission {
    /// Parse octal mode bits from a string like "644" or "0755".
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let mode = u32::from_str_radix(value, 8).ok().filter(|m| *m <= 0o7777);
        match mode {
            Some(mode) => Ok(Self(mode)),
            None => Err(ConfigError::InvalidPermission {
                value: value.to_string(),
            }),
        }
    }

    /// The raw mode bits.
    pub fn mode(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for FsPermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:o}", self.0)
    }
}

impl Serialize for FsPermission {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:o}", self.0))
    }
}

impl<'de> Deserialize<'de> for FsPermission {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        FsPermission::parse(&value).map_err(D::Error::custom)
    }
}

/// Backoff strategy for directory-creation retry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    /// Delay grows by `multiplier` after every attempt.
    #[default]
    Exponential,
    /// Constant delay between attempts.
    Fixed,
}

/// Retry policy for directory creation.
///
/// Disabled by default; when enabled, defaults to a 2 minute budget with a
/// 5 second base interval doubling every attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Whether directory-creation retry is enabled (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Total retry budget in milliseconds (default: 120000).
    #[serde(default = "default_retry_timeout_ms")]
    pub timeout_ms: u64,
    /// Base delay between attempts in milliseconds (default: 5000).
    #[serde(default = "default_retry_interval_ms")]
    pub interval_ms: u64,
    /// Backoff multiplier applied per attempt (default: 2).
    #[serde(default = "default_retry_multiplier")]
    pub multiplier: u32,
    /// Backoff strategy (default: exponential).
    #[serde(default)]
    pub strategy: RetryStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: default_retry_timeout_ms(),
            interval_ms: default_retry_interval_ms(),
            multiplier: default_retry_multiplier(),
            strategy: RetryStrategy::default(),
        }
    }
}

impl RetryConfig {
    /// Total retry budget.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Base delay between attempts.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_retry_timeout_ms() -> u64 {
    120_000
}

fn default_retry_interval_ms() -> u64 {
    5_000
}

fn default_retry_multiplier() -> u32 {
    2
}

/// Configuration for a staged file writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Root directory for staging files.
    pub staging_dir: PathBuf,
    /// Root directory for committed output files.
    pub output_dir: PathBuf,
    /// Embed the record count in committed file names (default: false).
    #[serde(default)]
    pub include_record_count_in_file_names: bool,
    /// Directory-creation retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Stream buffer size in bytes (default: 4096).
    #[serde(default)]
    pub buffer_size: Option<usize>,
    /// Replication factor hint, storage default when unset.
    #[serde(default)]
    pub replication: Option<u16>,
    /// Block size hint in bytes, storage default when unset.
    #[serde(default)]
    pub block_size: Option<u64>,
    /// Permission bits for created files (default: "644").
    #[serde(default = "default_file_permission")]
    pub file_permission: FsPermission,
    /// Permission bits for created directories (default: "755").
    #[serde(default = "default_dir_permission")]
    pub dir_permission: FsPermission,
    /// Owner group applied to the staging file after creation.
    #[serde(default)]
    pub group: Option<String>,
}

fn default_file_permission() -> FsPermission {
    FsPermission(0o644)
}

fn default_dir_permission() -> FsPermission {
    FsPermission(0o755)
}

impl WriterConfig {
    /// Create a config with defaults for the given staging and output roots.
    pub fn new(staging_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            output_dir: output_dir.into(),
            include_record_count_in_file_names: false,
            retry: RetryConfig::default(),
            buffer_size: None,
            replication: None,
            block_size: None,
            file_permission: default_file_permission(),
            dir_permission: default_dir_permission(),
            group: None,
        }
    }

    /// Parse a config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).context(YamlParseSnafu)
    }

    /// Load a config from a YAML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).context(ReadFileSnafu)?;
        Self::from_yaml(&contents)
    }
}
