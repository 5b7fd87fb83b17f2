//! Storage service abstraction.
//!
//! The writer treats the filesystem as an external hierarchical storage
//! service offering atomic rename within a single namespace, file creation
//! with permission/replication/block-size parameters, and
//! existence/stat/delete operations. The reference implementation is the
//! local filesystem; distributed backends plug in behind the same trait.

mod local;

pub use local::LocalFs;

use async_trait::async_trait;
use std::path::Path;

use crate::codec::EncodedWrite;
use crate::config::{FsPermission, WriterConfig};
use crate::error::StorageError;

/// Creation parameters for staging files, resolved once at writer
/// construction from configuration with storage-provided defaults as
/// fallback.
#[derive(Debug, Clone)]
pub struct FileProperties {
    /// Stream buffer size in bytes.
    pub buffer_size: usize,
    /// Replication factor hint.
    pub replication: u16,
    /// Block size hint in bytes.
    pub block_size: u64,
    /// Permission bits for created files.
    pub file_permission: FsPermission,
    /// Permission bits for created directories.
    pub dir_permission: FsPermission,
    /// Owner group applied to the staging file after creation.
    pub group: Option<String>,
}

impl FileProperties {
    /// Resolve file properties from config, falling back to storage defaults
    /// for replication and block size.
    pub fn resolve(config: &WriterConfig, storage: &dyn StorageService) -> Self {
        Self {
            buffer_size: config
                .buffer_size
                .unwrap_or(crate::config::DEFAULT_BUFFER_SIZE),
            replication: config
                .replication
                .unwrap_or_else(|| storage.default_replication()),
            block_size: config
                .block_size
                .unwrap_or_else(|| storage.default_block_size()),
            file_permission: config.file_permission,
            dir_permission: config.dir_permission,
            group: config.group.clone(),
        }
    }
}

/// Stat result for a stored file.
#[derive(Debug, Clone, Copy)]
pub struct FileStatus {
    /// File length in bytes.
    pub length: u64,
    /// Actual permission bits on the file.
    pub permission: FsPermission,
}

/// Hierarchical storage service used by the staged writer.
///
/// Rename must be atomic within the storage namespace: a failed rename
/// leaves the old state fully intact, and no observer ever sees partial
/// content at the destination.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Create a file and return its raw writable stream.
    ///
    /// With `overwrite` an existing file at the path is truncated; missing
    /// parent directories are created. Replication and block size are hints
    /// backends may ignore.
    async fn create(
        &self,
        path: &Path,
        properties: &FileProperties,
        overwrite: bool,
    ) -> Result<Box<dyn EncodedWrite>, StorageError>;

    /// Whether a path exists.
    async fn exists(&self, path: &Path) -> Result<bool, StorageError>;

    /// Stat a file.
    async fn file_status(&self, path: &Path) -> Result<FileStatus, StorageError>;

    /// Atomically rename `src` to `dst`.
    ///
    /// With `overwrite` an existing destination is replaced; without it the
    /// rename fails if the destination exists.
    async fn rename(&self, src: &Path, dst: &Path, overwrite: bool) -> Result<(), StorageError>;

    /// Delete a path. Returns false if the path did not exist.
    async fn delete(&self, path: &Path, recursive: bool) -> Result<bool, StorageError>;

    /// Set permission bits on a path.
    async fn set_permission(&self, path: &Path, perm: FsPermission) -> Result<(), StorageError>;

    /// Set the owner group of a path.
    async fn set_group(&self, path: &Path, group: &str) -> Result<(), StorageError>;

    /// Ensure a directory and all missing ancestors exist.
    ///
    /// The requested permission is applied only to directories this call
    /// creates; pre-existing ancestors are left untouched. Idempotent.
    async fn ensure_dirs(&self, path: &Path, perm: FsPermission) -> Result<(), StorageError>;

    /// Default replication factor for files without an explicit setting.
    fn default_replication(&self) -> u16;

    /// Default block size for files without an explicit setting.
    fn default_block_size(&self) -> u64;

    /// Storage scheme (e.g. "file").
    fn scheme(&self) -> &str;

    /// Storage authority (host or namespace), empty for local storage.
    fn authority(&self) -> &str;
}
