//! End-to-end lifecycle tests for the staged writer.

use std::io::Read;
use std::sync::Arc;
use tempfile::TempDir;

use snowdrift::writer::{BYTES_WRITTEN_KEY, RECORDS_WRITTEN_KEY};
use snowdrift::{
    ByteRecordWriter, DataWriter, Descriptor, FsWriterBuilder, GzipCodec, LocalFs, StreamCodec,
    TaskState, WriterConfig, WriterError, WriterMetrics, ZstdCodec,
};

fn test_config(temp_dir: &TempDir) -> WriterConfig {
    WriterConfig::new(
        temp_dir.path().join("staging"),
        temp_dir.path().join("output"),
    )
}

fn test_builder(
    config: WriterConfig,
    task_state: Arc<TaskState>,
    writer_id: &str,
    file_name: &str,
) -> FsWriterBuilder {
    FsWriterBuilder::new(
        Arc::new(LocalFs::new()),
        task_state,
        config,
        writer_id,
        file_name,
    )
}

#[tokio::test]
async fn test_commit_promotes_staged_bytes() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let task_state = Arc::new(TaskState::new());

    // No codecs, 4096 byte buffer (the default), a single "hello" record.
    let builder = test_builder(config, task_state, "writer-1", "part-0.txt");
    let mut writer = ByteRecordWriter::with_delimiter(builder, None).await.unwrap();

    writer.write(b"hello").unwrap();
    assert_eq!(writer.raw_bytes_written(), 5);
    assert_eq!(writer.bytes_written().unwrap(), 0);

    writer.commit().await.unwrap();

    let staging = writer.engine().staging_path().to_path_buf();
    let output = writer.engine().output_path();

    assert!(!staging.exists(), "staging path must be gone after commit");
    assert!(output.exists(), "output path must exist after commit");
    assert_eq!(writer.bytes_written().unwrap(), 5);
    assert_eq!(std::fs::read(&output).unwrap(), b"hello");
    assert_eq!(
        writer.bytes_written().unwrap(),
        std::fs::metadata(&output).unwrap().len()
    );
}

#[tokio::test]
async fn test_commit_overwrites_previous_attempt_output() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let task_state = Arc::new(TaskState::new());

    // A previous failed attempt already promoted something.
    let output_dir = temp_dir.path().join("output");
    std::fs::create_dir_all(&output_dir).unwrap();
    std::fs::write(output_dir.join("part-0.txt"), b"stale content").unwrap();

    let builder = test_builder(config, task_state, "writer-1", "part-0.txt");
    let mut writer = ByteRecordWriter::with_delimiter(builder, None).await.unwrap();
    writer.write(b"fresh").unwrap();
    writer.commit().await.unwrap();

    assert_eq!(
        std::fs::read(writer.engine().output_path()).unwrap(),
        b"fresh"
    );
}

#[tokio::test]
async fn test_reconstruction_reclaims_stale_staging_file() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let task_state = Arc::new(TaskState::new());

    // First writer stages data and dies without commit or cleanup.
    let builder = test_builder(config.clone(), task_state.clone(), "writer-1", "part-0.txt")
        .attempt_id("attempt_1");
    let mut first = ByteRecordWriter::with_delimiter(builder, None).await.unwrap();
    first.write(b"orphaned").unwrap();
    first.close().await.unwrap();
    let staging = first.engine().staging_path().to_path_buf();
    assert!(staging.exists());
    drop(first);

    // Retry with the same attempt identity must not fail, and must end with
    // exactly the new writer's content.
    let builder =
        test_builder(config, task_state, "writer-1", "part-0.txt").attempt_id("attempt_1");
    let mut second = ByteRecordWriter::with_delimiter(builder, None).await.unwrap();
    assert_eq!(second.engine().staging_path(), staging.as_path());
    second.write(b"retried").unwrap();
    second.commit().await.unwrap();

    assert!(!staging.exists());
    assert_eq!(
        std::fs::read(second.engine().output_path()).unwrap(),
        b"retried"
    );
}

#[tokio::test]
async fn test_record_count_in_file_name() {
    let temp_dir = TempDir::new().unwrap();
    let task_state = Arc::new(TaskState::new());

    let mut config = test_config(&temp_dir);
    config.include_record_count_in_file_names = true;

    let builder = test_builder(config, task_state.clone(), "writer-1", "part-0.txt");
    let mut writer = ByteRecordWriter::new(builder).await.unwrap();
    writer.write(b"a").unwrap();
    writer.write(b"b").unwrap();
    writer.write(b"c").unwrap();
    writer.commit().await.unwrap();

    let output = writer.engine().output_path();
    assert_eq!(output.file_name().unwrap(), "part-0.3.txt");
    assert!(output.exists());

    // Disabled suffixing must agree on byte content at the plain path.
    let config = test_config(&temp_dir);
    let builder = test_builder(config, task_state, "writer-2", "part-1.txt");
    let mut plain = ByteRecordWriter::new(builder).await.unwrap();
    plain.write(b"a").unwrap();
    plain.write(b"b").unwrap();
    plain.write(b"c").unwrap();
    plain.commit().await.unwrap();

    let plain_output = plain.engine().output_path();
    assert_eq!(plain_output.file_name().unwrap(), "part-1.txt");
    assert_eq!(
        std::fs::read(&output).unwrap(),
        std::fs::read(&plain_output).unwrap()
    );
}

#[tokio::test]
async fn test_codec_chain_decodes_in_configuration_order() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let task_state = Arc::new(TaskState::new());

    let encoders: Vec<Arc<dyn StreamCodec>> = vec![Arc::new(GzipCodec), Arc::new(ZstdCodec)];
    let builder =
        test_builder(config, task_state, "writer-1", "part-0.txt.gz.zst").encoders(encoders);
    let mut writer = ByteRecordWriter::with_delimiter(builder, None).await.unwrap();

    assert_eq!(
        writer.engine().transfer_metadata().transfer_encodings(),
        ["gzip", "zstd"]
    );

    writer.write(b"payload bytes for the codec chain").unwrap();
    writer.commit().await.unwrap();

    // Decode in configuration order: gzip first (outermost), then zstd.
    let encoded = std::fs::read(writer.engine().output_path()).unwrap();
    let mut gzip_decoded = Vec::new();
    flate2::read::GzDecoder::new(encoded.as_slice())
        .read_to_end(&mut gzip_decoded)
        .unwrap();
    let decoded = zstd::decode_all(gzip_decoded.as_slice()).unwrap();

    assert_eq!(decoded, b"payload bytes for the codec chain");
}

#[tokio::test]
async fn test_abort_removes_staging_file() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let task_state = Arc::new(TaskState::new());

    let builder = test_builder(config, task_state, "writer-1", "part-0.txt");
    let mut writer = ByteRecordWriter::new(builder).await.unwrap();
    writer.write(b"doomed").unwrap();

    let staging = writer.engine().staging_path().to_path_buf();
    let output = writer.engine().output_path();

    writer.abort().await.unwrap();

    assert!(!staging.exists());
    assert!(!output.exists());

    // Aborting again is harmless: the staging file is already absent.
    writer.abort().await.unwrap();
}

#[tokio::test]
async fn test_double_commit_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let task_state = Arc::new(TaskState::new());

    let builder = test_builder(config, task_state, "writer-1", "part-0.txt");
    let mut writer = ByteRecordWriter::new(builder).await.unwrap();
    writer.write(b"once").unwrap();
    writer.commit().await.unwrap();

    let err = writer.commit().await.unwrap_err();
    assert!(matches!(err, WriterError::AlreadyCommitted));
}

#[tokio::test]
async fn test_commit_after_abort_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let task_state = Arc::new(TaskState::new());

    let builder = test_builder(config, task_state, "writer-1", "part-0.txt");
    let mut writer = ByteRecordWriter::new(builder).await.unwrap();
    writer.write(b"discarded").unwrap();
    writer.abort().await.unwrap();

    let err = writer.commit().await.unwrap_err();
    assert!(matches!(err, WriterError::AlreadyAborted));
    assert!(!writer.engine().output_path().exists());
}

#[tokio::test]
async fn test_commit_publishes_metrics_and_output_paths() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let task_state = Arc::new(TaskState::new());

    let builder = test_builder(config.clone(), task_state.clone(), "writer-1", "part-0.txt")
        .partition_key("date=2026-08-27");
    let mut writer = ByteRecordWriter::new(builder).await.unwrap();
    writer.write(b"r1").unwrap();
    writer.write(b"r2").unwrap();
    writer.commit().await.unwrap();

    // Partition key published at construction.
    assert_eq!(
        task_state.get_prop("writer.partition.path_writer-1").as_deref(),
        Some("date=2026-08-27")
    );

    // Serialized metrics published at commit.
    let json = task_state.get_prop("fs_writer_metrics").unwrap();
    let metrics = WriterMetrics::from_json(&json).unwrap();
    assert_eq!(metrics.writer_id, "writer-1");
    assert_eq!(metrics.partition.branch_id, 0);
    assert_eq!(
        metrics.partition.partition_key.as_deref(),
        Some("date=2026-08-27")
    );
    let info = metrics.file_infos.iter().next().unwrap();
    assert_eq!(info.file_name, "part-0.txt");
    assert_eq!(info.record_count, 2);

    // A second writer in the same task unions into the output-paths set.
    let builder = test_builder(config, task_state.clone(), "writer-2", "part-1.txt");
    let mut second = ByteRecordWriter::new(builder).await.unwrap();
    second.write(b"r3").unwrap();
    second.commit().await.unwrap();

    let files = task_state.get_set_prop("writer.final.output.file.paths");
    assert_eq!(files.len(), 2);
}

#[tokio::test]
async fn test_final_state_before_and_after_commit() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let task_state = Arc::new(TaskState::new());

    let builder = test_builder(config, task_state, "writer-1", "part-0.txt");
    let mut writer = ByteRecordWriter::with_delimiter(builder, None).await.unwrap();
    writer.write(b"hello").unwrap();

    let state = writer.final_state();
    assert_eq!(state.get(RECORDS_WRITTEN_KEY).map(String::as_str), Some("1"));
    assert_eq!(state.get(BYTES_WRITTEN_KEY).map(String::as_str), Some("0"));

    writer.commit().await.unwrap();

    let state = writer.final_state();
    assert_eq!(state.get(BYTES_WRITTEN_KEY).map(String::as_str), Some("5"));
}

#[tokio::test]
async fn test_speculative_attempt_safety() {
    let temp_dir = TempDir::new().unwrap();
    let task_state = Arc::new(TaskState::new());

    let builder = test_builder(test_config(&temp_dir), task_state.clone(), "w1", "a.txt");
    let without_attempt = ByteRecordWriter::new(builder).await.unwrap();
    assert!(!without_attempt.is_speculative_attempt_safe());

    let builder = test_builder(test_config(&temp_dir), task_state, "w2", "b.txt")
        .attempt_id("attempt_1");
    let with_attempt = ByteRecordWriter::new(builder).await.unwrap();
    assert!(with_attempt.is_speculative_attempt_safe());
}

#[tokio::test]
async fn test_concurrent_attempts_do_not_share_staging() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let task_state = Arc::new(TaskState::new());

    let builder = test_builder(config.clone(), task_state.clone(), "writer-1", "part-0.txt")
        .attempt_id("attempt_1");
    let mut first = ByteRecordWriter::with_delimiter(builder, None).await.unwrap();

    let builder = test_builder(config, task_state, "writer-1", "part-0.txt")
        .attempt_id("attempt_2");
    let mut second = ByteRecordWriter::with_delimiter(builder, None).await.unwrap();

    assert_ne!(
        first.engine().staging_path(),
        second.engine().staging_path()
    );
    assert_eq!(first.engine().output_path(), second.engine().output_path());

    first.write(b"from attempt 1").unwrap();
    second.write(b"from attempt 2").unwrap();

    // The coordinator lets one attempt win; its content lands at the
    // shared output path.
    second.commit().await.unwrap();
    first.abort().await.unwrap();

    assert_eq!(
        std::fs::read(second.engine().output_path()).unwrap(),
        b"from attempt 2"
    );
}

#[tokio::test]
async fn test_branch_scoped_paths_and_properties() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let task_state = Arc::new(TaskState::new());

    let builder = test_builder(config, task_state.clone(), "writer-1", "part-0.txt").branch(2, 1);
    let mut writer = ByteRecordWriter::new(builder).await.unwrap();
    writer.write(b"branched").unwrap();
    writer.commit().await.unwrap();

    let output = writer.engine().output_path();
    assert!(output.parent().unwrap().ends_with("branch_1"));

    let files = task_state.get_set_prop("writer.final.output.file.paths.branch_1");
    assert_eq!(files.len(), 1);
}

#[tokio::test]
async fn test_data_descriptor() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let output_dir = config.output_dir.clone();
    let task_state = Arc::new(TaskState::new());

    let builder = test_builder(config.clone(), task_state.clone(), "w1", "a.txt");
    let plain = ByteRecordWriter::new(builder).await.unwrap();
    match plain.engine().data_descriptor() {
        Descriptor::Dataset(dataset) => {
            assert_eq!(dataset.scheme, "file");
            assert_eq!(dataset.path, output_dir);
        }
        other => panic!("expected dataset descriptor, got {other:?}"),
    }

    let builder = test_builder(config, task_state, "w2", "b.txt").partition_key("date=2026-08-27");
    let partitioned = ByteRecordWriter::new(builder).await.unwrap();
    match partitioned.engine().data_descriptor() {
        Descriptor::Partition { partition_key, .. } => {
            assert_eq!(partition_key, "date=2026-08-27");
        }
        other => panic!("expected partition descriptor, got {other:?}"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_commit_repairs_drifted_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let task_state = Arc::new(TaskState::new());

    let builder = test_builder(config, task_state, "writer-1", "part-0.txt");
    let mut writer = ByteRecordWriter::new(builder).await.unwrap();
    writer.write(b"record").unwrap();

    // Simulate permission drift on the staging file before commit.
    std::fs::set_permissions(
        writer.engine().staging_path(),
        std::fs::Permissions::from_mode(0o600),
    )
    .unwrap();

    writer.commit().await.unwrap();

    let mode = std::fs::metadata(writer.engine().output_path())
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o7777, 0o644);
}

#[tokio::test]
async fn test_commit_fails_when_staging_file_vanishes() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let task_state = Arc::new(TaskState::new());

    let builder = test_builder(config, task_state, "writer-1", "part-0.txt");
    let mut writer = ByteRecordWriter::new(builder).await.unwrap();
    writer.write(b"record").unwrap();
    writer.close().await.unwrap();

    // External interference: the staging file disappears before commit.
    std::fs::remove_file(writer.engine().staging_path()).unwrap();

    let err = writer.commit().await.unwrap_err();
    assert!(matches!(err, WriterError::StagingFileMissing { .. }));
}
