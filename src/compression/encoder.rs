//! Codec registry and compression policy

use std::collections::HashMap;

use tracing::debug;

use super::{Codec, CompressionLevel, CompressionType, Lz4Codec, ZstdCodec};
use crate::sample::{Frame, PixelFormat, StreamKind};
use crate::{RecorderError, Result};

/// Binds at most one codec per stream
///
/// The policy is fixed at construction: a default algorithm plus optional
/// per-stream overrides, so the same stream always gets the same answer.
pub struct Encoder {
    default: CompressionType,
    overrides: HashMap<StreamKind, CompressionType>,
    /// `None` records an explicit "no compression" binding
    codecs: HashMap<StreamKind, Option<Box<dyn Codec>>>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(CompressionType::Lz4)
    }
}

impl Encoder {
    /// Create an encoder whose policy selects `default` for every stream
    #[must_use]
    pub fn new(default: CompressionType) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
            codecs: HashMap::new(),
        }
    }

    /// Select a different algorithm for one stream
    #[must_use]
    pub fn with_override(mut self, stream: StreamKind, kind: CompressionType) -> Self {
        self.overrides.insert(stream, kind);
        self
    }

    /// Algorithm the policy assigns to a stream
    #[must_use]
    pub fn compression_policy(&self, stream: StreamKind, _format: PixelFormat) -> CompressionType {
        self.overrides.get(&stream).copied().unwrap_or(self.default)
    }

    /// Bind the policy's codec to a stream. No-op if already bound.
    pub fn add_codec(&mut self, stream: StreamKind, format: PixelFormat, level: CompressionLevel) {
        if self.codecs.contains_key(&stream) {
            return;
        }

        let codec: Option<Box<dyn Codec>> = match self.compression_policy(stream, format) {
            CompressionType::Lz4 => Some(Box::new(Lz4Codec::new(level))),
            CompressionType::Zstd => Some(Box::new(ZstdCodec::new(level))),
            CompressionType::None => None,
        };

        debug!(
            "Bound codec {:?} to stream {:?}",
            codec.as_ref().map(|c| c.compression_type()),
            stream
        );
        self.codecs.insert(stream, codec);
    }

    /// Algorithm currently bound to a stream, `None` if unbound
    #[must_use]
    pub fn compression_type(&self, stream: StreamKind) -> CompressionType {
        match self.codecs.get(&stream) {
            Some(Some(codec)) => codec.compression_type(),
            _ => CompressionType::None,
        }
    }

    /// Compress one frame's payload with the stream's bound codec
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::FeatureUnsupported`] if no codec is bound to
    /// the frame's stream, or the codec's error if compression fails
    pub fn encode(&self, frame: &Frame, input: &[u8]) -> Result<Vec<u8>> {
        match self.codecs.get(&frame.stream) {
            Some(Some(codec)) => codec.encode(&frame.info(), input),
            _ => Err(RecorderError::FeatureUnsupported(frame.stream)),
        }
    }
}
