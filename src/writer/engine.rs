//! The staged-write promotion engine.
//!
//! Owns the staging/commit/cleanup lifecycle shared by all format-specific
//! writers: staging path derivation, stale-staging recovery, codec-chained
//! stream creation, atomic promotion on commit, and metrics publication.

use snafu::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::codec::{EncodedWrite, StreamCodec, TransferMetadata, wrap_encoders};
use crate::config::WriterConfig;
use crate::emit;
use crate::error::{StagingFileMissingSnafu, StreamIoSnafu, WriterError};
use crate::identity::{WriterIdentity, WriterPaths, file_path_with_record_count};
use crate::metrics::events::{FileCommitted, StagingFileDeleted, WriterAborted};
use crate::retry::ensure_dirs_with_retry;
use crate::state::{
    FS_WRITER_METRICS_KEY, TaskState, WRITER_FINAL_OUTPUT_FILE_PATHS, WRITER_PARTITION_PATH_KEY,
};
use crate::storage::{FileProperties, StorageService};
use crate::writer::report::{
    DatasetDescriptor, Descriptor, FileInfo, PartitionIdentifier, WriterMetrics,
};

/// Builder for [`FsWriterEngine`].
pub struct FsWriterBuilder {
    storage: Arc<dyn StorageService>,
    task_state: Arc<TaskState>,
    config: WriterConfig,
    writer_id: String,
    num_branches: u32,
    branch_id: u32,
    file_name: String,
    attempt_id: Option<String>,
    partition_key: Option<String>,
    encoders: Vec<Arc<dyn StreamCodec>>,
}

impl FsWriterBuilder {
    pub fn new(
        storage: Arc<dyn StorageService>,
        task_state: Arc<TaskState>,
        config: WriterConfig,
        writer_id: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            task_state,
            config,
            writer_id: writer_id.into(),
            num_branches: 1,
            branch_id: 0,
            file_name: file_name.into(),
            attempt_id: None,
            partition_key: None,
            encoders: Vec::new(),
        }
    }

    pub fn branch(mut self, num_branches: u32, branch_id: u32) -> Self {
        self.num_branches = num_branches;
        self.branch_id = branch_id;
        self
    }

    pub fn attempt_id(mut self, attempt_id: impl Into<String>) -> Self {
        self.attempt_id = Some(attempt_id.into());
        self
    }

    pub fn partition_key(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    pub fn encoder(mut self, encoder: Arc<dyn StreamCodec>) -> Self {
        self.encoders.push(encoder);
        self
    }

    pub fn encoders(mut self, encoders: Vec<Arc<dyn StreamCodec>>) -> Self {
        self.encoders = encoders;
        self
    }

    /// Construct the engine: derive paths, reclaim any stale staging file,
    /// and ensure the output parent directory exists (with retry).
    pub async fn build(self) -> Result<FsWriterEngine, WriterError> {
        let identity = WriterIdentity {
            writer_id: self.writer_id,
            num_branches: self.num_branches,
            branch_id: self.branch_id,
            file_name: self.file_name,
            attempt_id: self.attempt_id,
        };
        let paths = WriterPaths::derive(&self.config, &identity);

        // A staging file left behind by a prior failed attempt would block
        // this retry; reclaim it.
        if self.storage.exists(&paths.staging_path).await? {
            warn!(
                staging = %paths.staging_path.display(),
                "Staging file already exists, deleting it"
            );
            self.storage.delete(&paths.staging_path, false).await?;
            emit!(StagingFileDeleted {
                writer: identity.writer_id.clone(),
            });
        }

        let properties = FileProperties::resolve(&self.config, self.storage.as_ref());

        if self.config.retry.enabled {
            debug!(
                timeout_ms = self.config.retry.timeout_ms,
                interval_ms = self.config.retry.interval_ms,
                multiplier = self.config.retry.multiplier,
                "Retry enabled for writer directory creation"
            );
        } else {
            debug!("Retry disabled for writer directory creation");
        }
        ensure_dirs_with_retry(
            self.storage.as_ref(),
            paths.output_parent(),
            properties.dir_permission,
            &self.config.retry,
        )
        .await?;

        let transfer_metadata = TransferMetadata::from_encoders(&self.encoders);

        if let Some(partition_key) = &self.partition_key {
            self.task_state.set_prop(
                &format!("{WRITER_PARTITION_PATH_KEY}_{}", identity.writer_id),
                partition_key.clone(),
            );
        }

        let all_output_files_prop =
            identity.property_name_for_branch(WRITER_FINAL_OUTPUT_FILE_PATHS);

        Ok(FsWriterEngine {
            storage: self.storage,
            task_state: self.task_state,
            staging_path: paths.staging_path,
            output_path: Mutex::new(paths.output_path),
            identity,
            properties,
            encoders: self.encoders,
            transfer_metadata,
            include_record_count: self.config.include_record_count_in_file_names,
            all_output_files_prop,
            partition_key: self.partition_key,
            stream: None,
            bytes_written: None,
            stage: WriterStage::Open,
        })
    }
}

/// Writer lifecycle stage: Open -> Closed -> Committed, or Open -> Aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterStage {
    Open,
    Closed,
    Committed,
    Aborted,
}

/// Shared staging/commit/cleanup behavior for staged file writers.
///
/// One engine instance is driven by a single logical task thread. The only
/// state shared across writer instances within a task is the accumulated
/// output-files property and the output-path mutation at commit; both are
/// guarded by process-local locks, nothing here is distributed.
pub struct FsWriterEngine {
    storage: Arc<dyn StorageService>,
    task_state: Arc<TaskState>,
    identity: WriterIdentity,
    staging_path: PathBuf,
    output_path: Mutex<PathBuf>,
    properties: FileProperties,
    encoders: Vec<Arc<dyn StreamCodec>>,
    transfer_metadata: TransferMetadata,
    include_record_count: bool,
    all_output_files_prop: String,
    partition_key: Option<String>,
    stream: Option<Box<dyn EncodedWrite>>,
    bytes_written: Option<u64>,
    stage: WriterStage,
}

impl FsWriterEngine {
    /// Open the staging file and wrap it in the configured codec chain.
    ///
    /// The composed stream is held by the engine and released from every
    /// exit path (commit, close, abort).
    pub async fn open_stream(&mut self) -> Result<(), WriterError> {
        ensure!(
            self.stage == WriterStage::Open && self.stream.is_none(),
            crate::error::StreamClosedSnafu
        );

        let raw = self
            .storage
            .create(&self.staging_path, &self.properties, true)
            .await?;
        let stream = wrap_encoders(raw, &self.encoders).context(StreamIoSnafu)?;
        self.stream = Some(stream);
        Ok(())
    }

    /// The composed record stream; writing to it produces encoded bytes at
    /// rest in the staging file.
    pub fn stream(&mut self) -> Result<&mut (dyn Write + Send), WriterError> {
        match self.stream.as_mut() {
            Some(stream) => Ok(stream),
            None => crate::error::StreamClosedSnafu.fail(),
        }
    }

    /// Finish the stream chain, outermost layer first so release cascades
    /// in reverse order of acquisition.
    fn release_stream(&mut self) -> Result<(), WriterError> {
        if let Some(stream) = self.stream.take() {
            stream.finish().context(StreamIoSnafu)?;
        }
        Ok(())
    }

    /// Promote the staging file to the output path.
    ///
    /// Single invocation; a second call fails with `AlreadyCommitted` and a
    /// call on an aborted writer fails with `AlreadyAborted`. When
    /// record-count naming is enabled the count is embedded in the file
    /// name *before* promotion, so a single atomic rename publishes the
    /// final name; there is no window where the file sits at an
    /// intermediate path.
    pub async fn commit(&mut self, records_written: u64) -> Result<(), WriterError> {
        ensure!(
            self.stage != WriterStage::Committed,
            crate::error::AlreadyCommittedSnafu
        );
        // Aborted is terminal too: the staging file is gone, so promotion
        // must not be attempted.
        ensure!(
            self.stage != WriterStage::Aborted,
            crate::error::AlreadyAbortedSnafu
        );

        self.release_stream()?;
        self.stage = WriterStage::Closed;

        if let Some(group) = self.properties.group.clone() {
            ensure!(
                self.storage.exists(&self.staging_path).await?,
                StagingFileMissingSnafu {
                    path: self.staging_path.clone(),
                }
            );
            self.storage.set_group(&self.staging_path, &group).await?;
        }

        // Guards against a previous partial commit or external interference.
        ensure!(
            self.storage.exists(&self.staging_path).await?,
            StagingFileMissingSnafu {
                path: self.staging_path.clone(),
            }
        );

        let status = self.storage.file_status(&self.staging_path).await?;

        // Filesystem defaults (umask) may have drifted the permission bits
        // at creation; reset them to the configured target.
        if status.permission != self.properties.file_permission {
            debug!(
                actual = %status.permission,
                configured = %self.properties.file_permission,
                "Resetting staging file permission"
            );
            self.storage
                .set_permission(&self.staging_path, self.properties.file_permission)
                .await?;
        }

        self.bytes_written = Some(status.length);

        let output_path = {
            let mut output = self
                .output_path
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.include_record_count {
                *output = file_path_with_record_count(&output, records_written);
            }
            output.clone()
        };

        info!(
            from = %self.staging_path.display(),
            to = %output_path.display(),
            "Moving data from staging to output"
        );
        // Overwrite an output file from a previous failed attempt so a task
        // retry is never blocked.
        self.storage
            .rename(&self.staging_path, &output_path, true)
            .await?;

        self.task_state.append_to_set_prop(
            &self.all_output_files_prop,
            output_path.display().to_string(),
        );

        let file_name = output_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let metrics = WriterMetrics::new(
            self.identity.writer_id.clone(),
            PartitionIdentifier {
                partition_key: self.partition_key.clone(),
                branch_id: self.identity.branch_id,
            },
            [FileInfo {
                file_name,
                record_count: records_written,
            }],
        );
        let json = metrics.to_json().context(crate::error::SerializeMetricsSnafu)?;
        self.task_state.set_prop(FS_WRITER_METRICS_KEY, json);

        emit!(FileCommitted {
            bytes: status.length,
            records: records_written,
            writer: self.identity.writer_id.clone(),
        });

        self.stage = WriterStage::Committed;
        Ok(())
    }

    /// Discard the current staging file. Safe to call whether or not the
    /// file exists; must not be called after commit.
    pub async fn abort(&mut self) -> Result<(), WriterError> {
        ensure!(
            self.stage != WriterStage::Committed,
            crate::error::AlreadyCommittedSnafu
        );

        if let Some(stream) = self.stream.take() {
            if let Err(error) = stream.finish() {
                warn!(%error, "Stream release failed during abort");
            }
        }

        if self.storage.exists(&self.staging_path).await? {
            self.storage.delete(&self.staging_path, false).await?;
        }
        emit!(WriterAborted {
            writer: self.identity.writer_id.clone(),
        });
        self.stage = WriterStage::Aborted;
        Ok(())
    }

    /// Release stream resources without committing; staging and output
    /// files are left untouched beyond what stream close implies.
    pub async fn close(&mut self) -> Result<(), WriterError> {
        self.release_stream()?;
        if self.stage == WriterStage::Open {
            self.stage = WriterStage::Closed;
        }
        Ok(())
    }

    /// Bytes at rest after commit; 0 before.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.unwrap_or(0)
    }

    /// The staging path this writer stages to.
    pub fn staging_path(&self) -> &Path {
        &self.staging_path
    }

    /// The current output path (reflects the record-count rename after
    /// commit when enabled).
    pub fn output_path(&self) -> PathBuf {
        self.output_path
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fully-qualified output path including scheme and authority.
    pub fn fully_qualified_output_path(&self) -> String {
        format!(
            "{}://{}{}",
            self.storage.scheme(),
            self.storage.authority(),
            self.output_path().display()
        )
    }

    /// Transfer encodings applied to the staged bytes, in decode order.
    pub fn transfer_metadata(&self) -> &TransferMetadata {
        &self.transfer_metadata
    }

    /// Whether an attempt id was supplied at construction.
    ///
    /// This is the engine's half of the speculative-safety predicate;
    /// writers combine it with their own state.
    pub fn attempt_id_supplied(&self) -> bool {
        self.identity.attempt_id.is_some()
    }

    /// Describe the logical dataset this writer produces into.
    pub fn data_descriptor(&self) -> Descriptor {
        let dataset = DatasetDescriptor {
            scheme: self.storage.scheme().to_string(),
            authority: self.storage.authority().to_string(),
            path: self
                .output_path()
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };

        match &self.partition_key {
            Some(partition_key) => Descriptor::Partition {
                partition_key: partition_key.clone(),
                dataset,
            },
            None => Descriptor::Dataset(dataset),
        }
    }
}
