//! Configuration types for rslrec

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::compression::{CompressionLevel, CompressionType, Encoder};
use crate::recording::reference_frame_rate;
use crate::sample::{PixelFormat, StreamKind};
use crate::storage::{CoordinateSystem, DeviceInfo, DeviceProperty, MotionIntrinsics};
use crate::{RecorderError, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Container file to create
    pub output: PathBuf,
    /// Coordinate system written to the file header
    #[serde(default)]
    pub coordinate_system: CoordinateSystem,
    /// Compression defaults
    #[serde(default)]
    pub compression: CompressionConfig,
    /// Streams to record
    pub streams: Vec<StreamConfig>,
    /// Device identification for the device-info chunk
    #[serde(default)]
    pub device: DeviceConfig,
}

/// Compression defaults applied to every stream without an override
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Algorithm
    #[serde(default)]
    pub kind: CompressionType,
    /// Speed/ratio trade-off
    #[serde(default)]
    pub level: CompressionLevel,
}

/// Profile of one recorded stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Stream identifier
    pub stream: StreamKind,
    /// Pixel format
    pub format: PixelFormat,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frames per second, must be nonzero
    pub framerate: u32,
    /// Per-stream compression override
    #[serde(default)]
    pub compression: Option<CompressionType>,
}

/// Device identification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name
    #[serde(default)]
    pub name: String,
    /// Serial number
    #[serde(default)]
    pub serial: String,
    /// Firmware version
    #[serde(default)]
    pub firmware: String,
}

impl DeviceConfig {
    /// Metadata with this identification and no capabilities or properties
    #[must_use]
    pub fn metadata(&self) -> DeviceMetadata {
        DeviceMetadata {
            info: DeviceInfo::new(&self.name, &self.serial, &self.firmware),
            ..DeviceMetadata::default()
        }
    }
}

/// Device description written once at configuration time
///
/// The recorder does not interpret any of these values.
#[derive(Debug, Clone, Default)]
pub struct DeviceMetadata {
    /// Device identification
    pub info: DeviceInfo,
    /// Raw capability identifiers
    pub capabilities: Vec<u32>,
    /// Motion sensor intrinsics
    pub motion_intrinsics: MotionIntrinsics,
    /// Device options at configuration time
    pub properties: Vec<DeviceProperty>,
}

impl RecorderConfig {
    /// Config with default compression and no device identification
    #[must_use]
    pub fn new(output: impl Into<PathBuf>, streams: Vec<StreamConfig>) -> Self {
        Self {
            output: output.into(),
            coordinate_system: CoordinateSystem::default(),
            compression: CompressionConfig::default(),
            streams,
            device: DeviceConfig::default(),
        }
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed, or is invalid
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RecorderError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| RecorderError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::InvalidFrameRate`] if no stream is configured
    /// or any frame rate is zero, [`RecorderError::ConfigError`] for
    /// duplicate streams or empty resolutions
    pub fn validate(&self) -> Result<()> {
        reference_frame_rate(self.streams.iter().map(|s| (s.stream, s.framerate)))?;

        let mut seen = HashSet::new();
        for (i, stream) in self.streams.iter().enumerate() {
            if !seen.insert(stream.stream) {
                return Err(RecorderError::ConfigError(format!(
                    "Stream {i}: {:?} configured more than once",
                    stream.stream
                )));
            }

            if stream.width == 0 || stream.height == 0 {
                return Err(RecorderError::ConfigError(format!(
                    "Stream {i}: resolution {}x{} is empty",
                    stream.width, stream.height
                )));
            }
        }

        Ok(())
    }

    /// Build the compression policy for this configuration
    #[must_use]
    pub fn encoder(&self) -> Encoder {
        self.streams
            .iter()
            .filter_map(|s| s.compression.map(|kind| (s.stream, kind)))
            .fold(Encoder::new(self.compression.kind), |encoder, (stream, kind)| {
                encoder.with_override(stream, kind)
            })
    }
}
