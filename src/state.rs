//! Task-scoped shared property store.
//!
//! An explicit mutable context object passed into writer construction; the
//! writer publishes its partition key, accumulated output file paths, and
//! serialized metrics here for the orchestrator to consume. Keys written by
//! this crate:
//!
//! - `writer.partition.path_{writer_id}`: partition key, at construction
//! - `writer.final.output.file.paths[.branch_N]`: set-valued, at commit
//! - `fs_writer_metrics`: serialized [`WriterMetrics`](crate::writer::WriterMetrics), at commit

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};

/// Property key under which serialized writer metrics are published.
pub const FS_WRITER_METRICS_KEY: &str = "fs_writer_metrics";

/// Property key prefix for the per-branch accumulated output file paths.
pub const WRITER_FINAL_OUTPUT_FILE_PATHS: &str = "writer.final.output.file.paths";

/// Property key prefix for the writer partition path.
pub const WRITER_PARTITION_PATH_KEY: &str = "writer.partition.path";

/// Mutable, task-scoped key → value(s) map shared by all writers in a task.
///
/// Locking is scoped to the single process executing the task; nothing here
/// is distributed. Scalar and set-valued properties live in separate maps so
/// a set append never clobbers a scalar.
#[derive(Debug, Default)]
pub struct TaskState {
    props: Mutex<HashMap<String, String>>,
    set_props: Mutex<HashMap<String, BTreeSet<String>>>,
}

impl TaskState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a scalar property, replacing any previous value.
    ///
    /// Lock poisoning is recovered from: individual property values stay
    /// consistent under a panicking peer, so the map remains usable.
    pub fn set_prop(&self, key: &str, value: impl Into<String>) {
        self.props
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.into());
    }

    /// Get a scalar property.
    pub fn get_prop(&self, key: &str) -> Option<String> {
        self.props
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Add a value to a set-valued property (union semantics across
    /// multiple writer invocations in the same task).
    pub fn append_to_set_prop(&self, key: &str, value: impl Into<String>) {
        self.set_props
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .insert(value.into());
    }

    /// Get a set-valued property.
    pub fn get_set_prop(&self, key: &str) -> BTreeSet<String> {
        self.set_props
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .unwrap_or_default()
    }
}
