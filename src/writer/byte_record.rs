//! Raw byte-record writer, the base concrete writer over the engine.

use async_trait::async_trait;
use snafu::prelude::*;
use std::io::Write;

use crate::error::{StreamIoSnafu, WriterError};
use crate::writer::engine::{FsWriterBuilder, FsWriterEngine};
use crate::writer::DataWriter;

/// Writes raw byte records to the staged stream, with an optional record
/// delimiter appended after each record.
///
/// This is the base writer type: it carries no format-specific state, so
/// its speculative-attempt safety is exactly the engine's attempt-id
/// predicate. Format-specific writers built the same way must re-derive
/// that predicate against their own state.
pub struct ByteRecordWriter {
    engine: FsWriterEngine,
    delimiter: Option<u8>,
    records_written: u64,
    raw_bytes_written: u64,
}

impl ByteRecordWriter {
    /// Build the writer and open its staged stream.
    pub async fn new(builder: FsWriterBuilder) -> Result<Self, WriterError> {
        Self::with_delimiter(builder, Some(b'\n')).await
    }

    /// Build with an explicit record delimiter (`None` for no delimiter).
    pub async fn with_delimiter(
        builder: FsWriterBuilder,
        delimiter: Option<u8>,
    ) -> Result<Self, WriterError> {
        let mut engine = builder.build().await?;
        engine.open_stream().await?;
        Ok(Self {
            engine,
            delimiter,
            records_written: 0,
            raw_bytes_written: 0,
        })
    }

    /// The underlying promotion engine.
    pub fn engine(&self) -> &FsWriterEngine {
        &self.engine
    }

    /// Raw (pre-encoding) bytes flushed through the stream.
    pub fn raw_bytes_written(&self) -> u64 {
        self.raw_bytes_written
    }
}

#[async_trait]
impl DataWriter<[u8]> for ByteRecordWriter {
    fn write(&mut self, record: &[u8]) -> Result<(), WriterError> {
        let stream = self.engine.stream()?;
        stream.write_all(record).context(StreamIoSnafu)?;
        let mut written = record.len() as u64;
        if let Some(delimiter) = self.delimiter {
            stream.write_all(&[delimiter]).context(StreamIoSnafu)?;
            written += 1;
        }
        self.records_written += 1;
        self.raw_bytes_written += written;
        Ok(())
    }

    fn records_written(&self) -> Result<u64, WriterError> {
        Ok(self.records_written)
    }

    fn bytes_written(&self) -> Result<u64, WriterError> {
        Ok(self.engine.bytes_written())
    }

    async fn commit(&mut self) -> Result<(), WriterError> {
        self.engine.commit(self.records_written).await
    }

    async fn abort(&mut self) -> Result<(), WriterError> {
        self.engine.abort().await
    }

    async fn close(&mut self) -> Result<(), WriterError> {
        self.engine.close().await
    }

    fn is_speculative_attempt_safe(&self) -> bool {
        // No state beyond the engine's, so the attempt-id predicate is the
        // whole answer here.
        self.engine.attempt_id_supplied()
    }
}
