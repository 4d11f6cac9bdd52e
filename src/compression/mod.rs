//! Per-stream payload compression

mod codec;
mod encoder;

pub use codec::{decompress, Lz4Codec, ZstdCodec};
pub use encoder::Encoder;

use serde::{Deserialize, Serialize};

use crate::storage::FrameInfo;
use crate::Result;

/// Compression algorithm recorded in each stream-info record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum CompressionType {
    /// Raw payload
    None = 0,
    /// LZ4 block with uncompressed-size prefix
    #[default]
    Lz4 = 1,
    /// Zstd frame
    Zstd = 2,
}

impl CompressionType {
    /// Decode a raw stream-info value
    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Lz4),
            2 => Some(Self::Zstd),
            _ => None,
        }
    }
}

/// Speed/ratio trade-off
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    /// Fastest
    Low,
    /// Balanced
    #[default]
    Medium,
    /// Smallest output
    High,
}

impl CompressionLevel {
    /// LZ4 block mode for this level
    #[must_use]
    pub fn to_lz4_mode(self) -> lz4::block::CompressionMode {
        match self {
            Self::Low => lz4::block::CompressionMode::FAST(8),
            Self::Medium => lz4::block::CompressionMode::DEFAULT,
            Self::High => lz4::block::CompressionMode::HIGHCOMPRESSION(9),
        }
    }

    /// Zstd level for this level
    #[must_use]
    pub fn to_zstd_level(self) -> i32 {
        match self {
            Self::Low => 1,
            Self::Medium => 3,
            Self::High => 19,
        }
    }
}

/// A frame payload compressor
pub trait Codec: Send {
    /// Algorithm this codec implements
    fn compression_type(&self) -> CompressionType;

    /// Compress one frame's raw payload
    ///
    /// # Errors
    ///
    /// Returns error if the underlying compressor fails
    fn encode(&self, info: &FrameInfo, input: &[u8]) -> Result<Vec<u8>>;
}
