//! Writer identity and deterministic staging/output path derivation.

use std::path::{Path, PathBuf};

use crate::config::WriterConfig;

/// Immutable identity of a single writer within a task.
///
/// The identity fully determines the staging and output paths: two writers
/// with the same branch and attempt identity derive the same staging path,
/// which is what makes a task retry able to reclaim a stale staging file.
#[derive(Debug, Clone)]
pub struct WriterIdentity {
    /// Unique writer id within the task.
    pub writer_id: String,
    /// Total number of output branches in the task.
    pub num_branches: u32,
    /// Branch this writer serves.
    pub branch_id: u32,
    /// File name of the output file (no directory component).
    pub file_name: String,
    /// Attempt id, present when speculative attempts may run concurrently.
    pub attempt_id: Option<String>,
}

impl WriterIdentity {
    /// Branch-qualified property name, matching the branch layout: the
    /// suffix is only added when the task actually forks into branches.
    pub fn property_name_for_branch(&self, key: &str) -> String {
        if self.num_branches > 1 {
            format!("{key}.branch_{}", self.branch_id)
        } else {
            key.to_string()
        }
    }

    fn branch_segment(&self) -> Option<String> {
        (self.num_branches > 1).then(|| format!("branch_{}", self.branch_id))
    }
}

/// The staging/output path pair derived from a writer identity.
///
/// The staging path is unique per attempt; the output path is stable across
/// attempts so that exactly one attempt's promotion wins.
#[derive(Debug, Clone)]
pub struct WriterPaths {
    /// Temporary write location, invisible to consumers until promoted.
    pub staging_path: PathBuf,
    /// Stable, externally visible location of committed data.
    pub output_path: PathBuf,
}

impl WriterPaths {
    /// Derive the path pair for an identity under the configured roots.
    pub fn derive(config: &WriterConfig, identity: &WriterIdentity) -> Self {
        let mut staging_dir = config.staging_dir.clone();
        let mut output_dir = config.output_dir.clone();

        if let Some(branch) = identity.branch_segment() {
            staging_dir.push(&branch);
            output_dir.push(&branch);
        }
        if let Some(attempt) = &identity.attempt_id {
            staging_dir.push(format!("_attempt_{attempt}"));
        }

        Self {
            staging_path: staging_dir.join(&identity.file_name),
            output_path: output_dir.join(&identity.file_name),
        }
    }

    /// Parent directory of the output path.
    pub fn output_parent(&self) -> &Path {
        // The output path always has the configured output root above it.
        self.output_path.parent().unwrap_or(Path::new(""))
    }
}

/// Rewrite a file name to embed the record count before the extension:
/// `part-0.txt` becomes `part-0.123.txt`, `part-0` becomes `part-0.123`.
pub fn file_path_with_record_count(path: &Path, record_count: u64) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let renamed = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}.{record_count}.{ext}"),
        None => format!("{stem}.{record_count}"),
    };
    path.with_file_name(renamed)
}
