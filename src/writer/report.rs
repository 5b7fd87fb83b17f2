//! Commit reports: writer metrics and dataset descriptors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Identifies the partition/branch a writer served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionIdentifier {
    /// Partition key, when the writer is partition-scoped.
    pub partition_key: Option<String>,
    /// Branch the writer served.
    pub branch_id: u32,
}

/// Per-file commit record: final file name and its record count.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_name: String,
    pub record_count: u64,
}

/// Metrics published once per commit, serialized into the shared property
/// store for orchestrator consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterMetrics {
    pub writer_id: String,
    pub partition: PartitionIdentifier,
    pub file_infos: BTreeSet<FileInfo>,
}

impl WriterMetrics {
    pub fn new(
        writer_id: impl Into<String>,
        partition: PartitionIdentifier,
        file_infos: impl IntoIterator<Item = FileInfo>,
    ) -> Self {
        Self {
            writer_id: writer_id.into(),
            partition,
            file_infos: file_infos.into_iter().collect(),
        }
    }

    /// Serialize for publication into the shared property store.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a previously published report.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Describes the logical dataset a writer produces into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    /// Storage scheme (e.g. "file").
    pub scheme: String,
    /// Storage authority, empty for local storage.
    pub authority: String,
    /// Output parent directory.
    pub path: PathBuf,
}

/// Dataset descriptor, optionally wrapped with a partition key when the
/// writer is partition-scoped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Descriptor {
    Dataset(DatasetDescriptor),
    Partition {
        partition_key: String,
        dataset: DatasetDescriptor,
    },
}
