//! snowdrift: crash-safe staged file writer for data ingestion pipelines.
//!
//! Records are written to a staging file through an ordered chain of
//! transfer-encoding codecs, then atomically promoted to the output path on
//! commit. The lifecycle is safe under task retry and partial failure:
//! stale staging files are reclaimed at construction, promotion overwrites
//! leftovers from failed attempts, and the rename is the sole publication
//! point, so no observer ever sees a partially written output file.
//!
//! - `writer/` - the promotion engine and the [`DataWriter`] trait
//! - `storage/` - hierarchical storage service abstraction and local backend
//! - `codec` - transfer-encoding codec chain (gzip, zstd, identity)
//! - `retry` - directory creation with exponential backoff
//! - `state` - task-scoped shared property store
//! - `config` - writer configuration and YAML loading
//! - `metrics` - metric events and the `emit!` macro
//! - `error` - error types

pub mod codec;
pub mod config;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod retry;
pub mod state;
pub mod storage;
pub mod writer;

// Re-export commonly used items
pub use codec::{GzipCodec, IdentityCodec, StreamCodec, TransferMetadata, ZstdCodec};
pub use config::{FsPermission, RetryConfig, WriterConfig};
pub use error::{ConfigError, MetricsError, StorageError, WriterError};
pub use identity::{WriterIdentity, WriterPaths};
pub use state::TaskState;
pub use storage::{FileProperties, FileStatus, LocalFs, StorageService};
pub use writer::{
    ByteRecordWriter, DataWriter, Descriptor, FinalState, FsWriterBuilder, FsWriterEngine,
    WriterMetrics,
};
