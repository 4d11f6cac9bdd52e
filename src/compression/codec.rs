//! Concrete codecs

use tracing::trace;

use super::{Codec, CompressionLevel, CompressionType};
use crate::storage::FrameInfo;
use crate::{RecorderError, Result};

/// LZ4 block compressor
///
/// Output is prefixed with the uncompressed length (4 bytes, little-endian)
/// so a reader can size its buffer without consulting the frame info.
pub struct Lz4Codec {
    level: CompressionLevel,
}

impl Lz4Codec {
    /// Create an LZ4 codec
    #[must_use]
    pub fn new(level: CompressionLevel) -> Self {
        Self { level }
    }
}

impl Codec for Lz4Codec {
    fn compression_type(&self) -> CompressionType {
        CompressionType::Lz4
    }

    fn encode(&self, info: &FrameInfo, input: &[u8]) -> Result<Vec<u8>> {
        let output = lz4::block::compress(input, Some(self.level.to_lz4_mode()), true)
            .map_err(|e| RecorderError::Compression(format!("LZ4 compression failed: {e}")))?;

        trace!(
            "lz4 frame {} of stream {}: {} -> {} bytes",
            info.number,
            info.stream,
            input.len(),
            output.len()
        );

        Ok(output)
    }
}

/// Zstd compressor
pub struct ZstdCodec {
    level: CompressionLevel,
}

impl ZstdCodec {
    /// Create a Zstd codec
    #[must_use]
    pub fn new(level: CompressionLevel) -> Self {
        Self { level }
    }
}

impl Codec for ZstdCodec {
    fn compression_type(&self) -> CompressionType {
        CompressionType::Zstd
    }

    fn encode(&self, info: &FrameInfo, input: &[u8]) -> Result<Vec<u8>> {
        let output = zstd::encode_all(input, self.level.to_zstd_level())
            .map_err(|e| RecorderError::Compression(format!("Zstd compression failed: {e}")))?;

        trace!(
            "zstd frame {} of stream {}: {} -> {} bytes",
            info.number,
            info.stream,
            input.len(),
            output.len()
        );

        Ok(output)
    }
}

/// Restore a payload written with the given compression type
///
/// # Errors
///
/// Returns error if the payload is not valid for `kind`
pub fn decompress(kind: CompressionType, data: &[u8]) -> Result<Vec<u8>> {
    match kind {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Lz4 => lz4::block::decompress(data, None)
            .map_err(|e| RecorderError::Compression(format!("LZ4 decompression failed: {e}"))),
        CompressionType::Zstd => zstd::decode_all(data)
            .map_err(|e| RecorderError::Compression(format!("Zstd decompression failed: {e}"))),
    }
}
