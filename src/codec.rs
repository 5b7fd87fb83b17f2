//! Transfer-encoding codec abstraction for the staged write path.
//!
//! Codecs wrap the raw staging stream in configuration order such that the
//! first configured codec is the outermost layer on read: encoding applies
//! innermost-first, so decoding proceeds in forward configuration order.

use std::io::{self, Write};
use std::sync::Arc;

use flate2::Compression;
use flate2::write::GzEncoder;

/// A writable stream layer that can be finished.
///
/// `finish` flushes and releases this layer and everything beneath it, so
/// finishing the outermost layer tears the whole chain down in reverse
/// order of acquisition.
pub trait EncodedWrite: Write + Send {
    /// Flush and release this layer and all inner layers.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// Trait for transfer-encoding codecs that wrap an output stream.
///
/// Each codec exposes a stable tag identifying the encoding; the tags are
/// collected into [`TransferMetadata`] so downstream consumers know how to
/// reverse the encoding.
pub trait StreamCodec: Send + Sync {
    /// Wrap a stream with this codec's encoding layer.
    fn encode(&self, inner: Box<dyn EncodedWrite>) -> io::Result<Box<dyn EncodedWrite>>;

    /// Stable tag identifying this encoding (e.g. "gzip").
    fn tag(&self) -> &'static str;
}

/// Gzip transfer encoding using flate2.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCodec;

struct GzipStream {
    encoder: GzEncoder<Box<dyn EncodedWrite>>,
}

impl Write for GzipStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

impl EncodedWrite for GzipStream {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let inner = self.encoder.finish()?;
        inner.finish()
    }
}

impl StreamCodec for GzipCodec {
    fn encode(&self, inner: Box<dyn EncodedWrite>) -> io::Result<Box<dyn EncodedWrite>> {
        Ok(Box::new(GzipStream {
            encoder: GzEncoder::new(inner, Compression::default()),
        }))
    }

    fn tag(&self) -> &'static str {
        "gzip"
    }
}

/// Zstandard transfer encoding using zstd.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZstdCodec;

struct ZstdStream {
    encoder: zstd::stream::write::Encoder<'static, Box<dyn EncodedWrite>>,
}

impl Write for ZstdStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

impl EncodedWrite for ZstdStream {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let inner = self.encoder.finish()?;
        inner.finish()
    }
}

impl StreamCodec for ZstdCodec {
    fn encode(&self, inner: Box<dyn EncodedWrite>) -> io::Result<Box<dyn EncodedWrite>> {
        Ok(Box::new(ZstdStream {
            encoder: zstd::stream::write::Encoder::new(inner, zstd::DEFAULT_COMPRESSION_LEVEL)?,
        }))
    }

    fn tag(&self) -> &'static str {
        "zstd"
    }
}

/// No-op codec: bytes pass through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl StreamCodec for IdentityCodec {
    fn encode(&self, inner: Box<dyn EncodedWrite>) -> io::Result<Box<dyn EncodedWrite>> {
        Ok(inner)
    }

    fn tag(&self) -> &'static str {
        "identity"
    }
}

/// Wrap a raw stream in the configured codec chain.
///
/// Codecs are applied in reverse configuration order so the first configured
/// codec ends up outermost on read.
pub fn wrap_encoders(
    raw: Box<dyn EncodedWrite>,
    encoders: &[Arc<dyn StreamCodec>],
) -> io::Result<Box<dyn EncodedWrite>> {
    let mut stream = raw;
    for encoder in encoders.iter().rev() {
        stream = encoder.encode(stream)?;
    }
    Ok(stream)
}

/// Ordered transfer-encoding tags recorded at writer construction.
///
/// The tag order equals configuration order, which is also the order a
/// downstream consumer must decode in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferMetadata {
    tags: Vec<String>,
}

impl TransferMetadata {
    /// Collect tags from the configured encoder chain.
    pub fn from_encoders(encoders: &[Arc<dyn StreamCodec>]) -> Self {
        Self {
            tags: encoders.iter().map(|e| e.tag().to_string()).collect(),
        }
    }

    /// Transfer-encoding tags in decode order.
    pub fn transfer_encodings(&self) -> &[String] {
        &self.tags
    }
}
