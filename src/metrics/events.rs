//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the writer
//! lifecycle. Events implement the `InternalEvent` trait which emits the
//! corresponding metric, labeled by writer id for multi-writer tasks.

use metrics::counter;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when a stale staging file from a prior attempt is deleted.
pub struct StagingFileDeleted {
    /// Writer label for multi-writer tasks.
    pub writer: String,
}

impl InternalEvent for StagingFileDeleted {
    fn emit(self) {
        trace!(writer = %self.writer, "Staging file deleted");
        counter!("snowdrift_staging_files_deleted_total", "writer" => self.writer).increment(1);
    }
}

/// Event emitted on each directory-creation retry attempt.
pub struct DirCreateRetried {
    pub attempt: u32,
}

impl InternalEvent for DirCreateRetried {
    fn emit(self) {
        trace!(attempt = self.attempt, "Directory creation retried");
        counter!("snowdrift_dir_create_retries_total").increment(1);
    }
}

/// Event emitted when a staging file is promoted to its output path.
pub struct FileCommitted {
    pub bytes: u64,
    pub records: u64,
    /// Writer label for multi-writer tasks.
    pub writer: String,
}

impl InternalEvent for FileCommitted {
    fn emit(self) {
        trace!(
            bytes = self.bytes,
            records = self.records,
            writer = %self.writer,
            "File committed"
        );
        counter!("snowdrift_files_committed_total", "writer" => self.writer.clone()).increment(1);
        counter!("snowdrift_bytes_written_total", "writer" => self.writer.clone())
            .increment(self.bytes);
        counter!("snowdrift_records_written_total", "writer" => self.writer)
            .increment(self.records);
    }
}

/// Event emitted when a writer is aborted and its staging file removed.
pub struct WriterAborted {
    /// Writer label for multi-writer tasks.
    pub writer: String,
}

impl InternalEvent for WriterAborted {
    fn emit(self) {
        trace!(writer = %self.writer, "Writer aborted");
        counter!("snowdrift_writers_aborted_total", "writer" => self.writer).increment(1);
    }
}
