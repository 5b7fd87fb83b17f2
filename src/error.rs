//! Error types for the snowdrift staged writer.

use snafu::prelude::*;
use std::path::PathBuf;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// IO error during a storage operation.
    #[snafu(display("IO error at {}: {source}", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Path does not exist.
    #[snafu(display("Path not found: {}", path.display()))]
    NotFound { path: PathBuf },

    /// Destination already exists and overwrite was not requested.
    #[snafu(display("Destination already exists: {}", path.display()))]
    AlreadyExists { path: PathBuf },

    /// Owner group could not be resolved to a gid.
    #[snafu(display("Unknown group: {group}"))]
    UnknownGroup { group: String },

    /// Group ownership is not supported on this platform.
    #[snafu(display("Group ownership is not supported on this platform"))]
    GroupUnsupported,

    /// Directory creation failed after exhausting the retry budget.
    #[snafu(display("Directory creation failed after {attempts} attempts: {source}"))]
    RetryExhausted {
        attempts: u32,
        #[snafu(source(from(StorageError, Box::new)))]
        source: Box<StorageError>,
    },
}

impl StorageError {
    /// Check if this error represents a "not found" condition.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::NotFound { .. } => true,
            StorageError::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },

    /// Permission string is not valid octal mode bits.
    #[snafu(display("Invalid octal permission: {value}"))]
    InvalidPermission { value: String },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Writer Errors ============

/// Errors surfaced by the staged writer lifecycle.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WriterError {
    /// Storage operation failed.
    #[snafu(display("Storage error: {source}"))]
    Storage { source: StorageError },

    /// IO error on the composed record stream.
    #[snafu(display("Stream IO error: {source}"))]
    StreamIo { source: std::io::Error },

    /// The staging file vanished before commit could promote it.
    #[snafu(display("Staging file {} does not exist", path.display()))]
    StagingFileMissing { path: PathBuf },

    /// Commit was invoked a second time on the same writer.
    #[snafu(display("Writer has already been committed"))]
    AlreadyCommitted,

    /// Commit was invoked on an aborted writer.
    #[snafu(display("Writer has already been aborted"))]
    AlreadyAborted,

    /// The record stream was requested after it had been released.
    #[snafu(display("Record stream is closed"))]
    StreamClosed,

    /// Failed to serialize writer metrics for publication.
    #[snafu(display("Failed to serialize writer metrics"))]
    SerializeMetrics { source: serde_json::Error },

    /// A record accessor is not implemented by this writer.
    #[snafu(display("Accessor not implemented: {name}"))]
    AccessorUnavailable { name: String },
}

impl From<StorageError> for WriterError {
    fn from(source: StorageError) -> Self {
        WriterError::Storage { source }
    }
}
