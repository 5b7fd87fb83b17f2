//! Staged data writers.
//!
//! Format-specific writers implement [`DataWriter`] and hold an
//! [`FsWriterEngine`] by composition: the engine owns the shared
//! staging/commit/cleanup behavior, the writer owns record serialization.

mod byte_record;
mod engine;
mod report;

pub use byte_record::ByteRecordWriter;
pub use engine::{FsWriterBuilder, FsWriterEngine};
pub use report::{DatasetDescriptor, Descriptor, FileInfo, PartitionIdentifier, WriterMetrics};

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::WriterError;

/// Best-effort final-state snapshot, keyed by property name.
pub type FinalState = BTreeMap<String, String>;

/// Property name for the record count in the final-state snapshot.
pub const RECORDS_WRITTEN_KEY: &str = "RecordsWritten";

/// Property name for the byte count in the final-state snapshot.
pub const BYTES_WRITTEN_KEY: &str = "BytesWritten";

/// A writer for records of type `D` with a staged-commit lifecycle.
///
/// Writes happen strictly before `commit`; `commit` and `abort` are
/// terminal. Implementations delegate the lifecycle to their engine and add
/// format-specific record encoding on top.
#[async_trait]
pub trait DataWriter<D: ?Sized>: Send {
    /// Write a single record to the staged stream.
    fn write(&mut self, record: &D) -> Result<(), WriterError>;

    /// Number of records written so far.
    fn records_written(&self) -> Result<u64, WriterError>;

    /// Bytes at rest after commit; 0 before.
    fn bytes_written(&self) -> Result<u64, WriterError>;

    /// Promote staged data to the output path. Single invocation; terminal.
    async fn commit(&mut self) -> Result<(), WriterError>;

    /// Discard staged data. Terminal; must not be called after commit.
    async fn abort(&mut self) -> Result<(), WriterError>;

    /// Release stream resources without committing or deleting anything.
    async fn close(&mut self) -> Result<(), WriterError>;

    /// Whether this writer may run as one of several concurrent speculative
    /// attempts of the same logical task.
    ///
    /// Defaults to `false`: speculative safety depends on state the engine
    /// cannot see, so every implementation must re-derive this predicate
    /// explicitly rather than inherit it.
    fn is_speculative_attempt_safe(&self) -> bool {
        false
    }

    /// Best-effort final-state snapshot.
    ///
    /// Each field is independently omitted (with the failure logged) when
    /// its accessor fails; this never propagates an error to the caller.
    fn final_state(&self) -> FinalState {
        let mut state = FinalState::new();

        match self.records_written() {
            Ok(records) => {
                state.insert(RECORDS_WRITTEN_KEY.to_string(), records.to_string());
            }
            Err(error) => {
                warn!(%error, "Failed to get final state recordsWritten");
            }
        }

        match self.bytes_written() {
            Ok(bytes) => {
                state.insert(BYTES_WRITTEN_KEY.to_string(), bytes.to_string());
            }
            Err(error) => {
                warn!(%error, "Failed to get final state bytesWritten");
            }
        }

        state
    }
}
