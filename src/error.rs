//! Error types for rslrec

use std::io;
use thiserror::Error;

use crate::sample::StreamKind;

/// Result type for rslrec operations
pub type Result<T> = std::result::Result<T, RecorderError>;

/// Errors that can occur while configuring or running a recorder
#[derive(Debug, Error)]
pub enum RecorderError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Recorder was already configured
    #[error("Recorder is already configured")]
    AlreadyConfigured,

    /// Operation requires a configured recorder
    #[error("Recorder is not configured")]
    NotConfigured,

    /// Operation is not valid in the current lifecycle state
    #[error("Invalid recorder state: {0}")]
    InvalidState(String),

    /// No stream configured, or a stream has a zero frame rate
    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(String),

    /// Encode requested for a stream without a bound codec
    #[error("Compression unsupported for stream {0:?}: no codec bound")]
    FeatureUnsupported(StreamKind),

    /// Codec failed to compress or decompress a payload
    #[error("Compression error: {0}")]
    Compression(String),

    /// Invalid container file format
    #[error("Invalid container format: {0}")]
    InvalidFormat(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}
