//! Local filesystem storage backend implementation.

use async_trait::async_trait;
use snafu::prelude::*;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::codec::EncodedWrite;
use crate::config::{FsPermission, MB};
use crate::error::{AlreadyExistsSnafu, IoSnafu, StorageError};
use crate::storage::{FileProperties, FileStatus, StorageService};

/// Local filesystem backend.
///
/// Replication and block size are accepted as hints and ignored; rename
/// maps to `rename(2)`, which atomically replaces the destination within a
/// single filesystem.
#[derive(Debug, Default)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }
}

/// Buffered raw file stream, the innermost layer of the codec chain.
struct LocalFileStream {
    writer: BufWriter<std::fs::File>,
}

impl Write for LocalFileStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl EncodedWrite for LocalFileStream {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }
}

#[async_trait]
impl StorageService for LocalFs {
    async fn create(
        &self,
        path: &Path,
        properties: &FileProperties,
        overwrite: bool,
    ) -> Result<Box<dyn EncodedWrite>, StorageError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context(IoSnafu { path: parent })?;
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let file = options.open(path).await.context(IoSnafu { path })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(properties.file_permission.mode());
            tokio::fs::set_permissions(path, perms)
                .await
                .context(IoSnafu { path })?;
        }

        Ok(Box::new(LocalFileStream {
            writer: BufWriter::with_capacity(properties.buffer_size, file.into_std().await),
        }))
    }

    async fn exists(&self, path: &Path) -> Result<bool, StorageError> {
        tokio::fs::try_exists(path).await.context(IoSnafu { path })
    }

    async fn file_status(&self, path: &Path) -> Result<FileStatus, StorageError> {
        let metadata = tokio::fs::metadata(path).await.context(IoSnafu { path })?;

        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            metadata.permissions().mode() & 0o7777
        };
        #[cfg(not(unix))]
        let mode = 0o644;

        Ok(FileStatus {
            length: metadata.len(),
            permission: FsPermission(mode),
        })
    }

    async fn rename(&self, src: &Path, dst: &Path, overwrite: bool) -> Result<(), StorageError> {
        if !overwrite {
            ensure!(!self.exists(dst).await?, AlreadyExistsSnafu { path: dst });
        }
        tokio::fs::rename(src, dst)
            .await
            .context(IoSnafu { path: src })
    }

    async fn delete(&self, path: &Path, recursive: bool) -> Result<bool, StorageError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e).context(IoSnafu { path }),
        };

        if metadata.is_dir() {
            if recursive {
                tokio::fs::remove_dir_all(path)
                    .await
                    .context(IoSnafu { path })?;
            } else {
                tokio::fs::remove_dir(path).await.context(IoSnafu { path })?;
            }
        } else {
            tokio::fs::remove_file(path)
                .await
                .context(IoSnafu { path })?;
        }
        Ok(true)
    }

    async fn set_permission(&self, path: &Path, perm: FsPermission) -> Result<(), StorageError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(perm.mode()))
                .await
                .context(IoSnafu { path })
        }
        #[cfg(not(unix))]
        {
            let _ = (path, perm);
            Ok(())
        }
    }

    #[cfg(unix)]
    async fn set_group(&self, path: &Path, group: &str) -> Result<(), StorageError> {
        let gid = resolve_gid(group)?;
        debug!(path = %path.display(), group, gid, "Setting owner group");
        std::os::unix::fs::chown(path, None, Some(gid)).context(IoSnafu { path })
    }

    #[cfg(not(unix))]
    async fn set_group(&self, _path: &Path, _group: &str) -> Result<(), StorageError> {
        Err(StorageError::GroupUnsupported)
    }

    async fn ensure_dirs(&self, path: &Path, perm: FsPermission) -> Result<(), StorageError> {
        // Collect ancestors that do not exist yet so the requested
        // permission is only applied to directories this call creates.
        let mut missing: Vec<PathBuf> = Vec::new();
        let mut current = Some(path);
        while let Some(dir) = current {
            if dir.as_os_str().is_empty() || self.exists(dir).await? {
                break;
            }
            missing.push(dir.to_path_buf());
            current = dir.parent();
        }

        for dir in missing.iter().rev() {
            match tokio::fs::create_dir(dir).await {
                Ok(()) => self.set_permission(dir, perm).await?,
                // A concurrent writer created it first; its permissions win.
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e).context(IoSnafu { path: dir }),
            }
        }
        Ok(())
    }

    fn default_replication(&self) -> u16 {
        1
    }

    fn default_block_size(&self) -> u64 {
        (128 * MB) as u64
    }

    fn scheme(&self) -> &str {
        "file"
    }

    fn authority(&self) -> &str {
        ""
    }
}

#[cfg(unix)]
fn resolve_gid(group: &str) -> Result<u32, StorageError> {
    let name = std::ffi::CString::new(group).map_err(|_| StorageError::UnknownGroup {
        group: group.to_string(),
    })?;
    // SAFETY: getgrnam returns a pointer to static storage or null.
    let entry = unsafe { libc::getgrnam(name.as_ptr()) };
    if entry.is_null() {
        return Err(StorageError::UnknownGroup {
            group: group.to_string(),
        });
    }
    Ok(unsafe { (*entry).gr_gid })
}
