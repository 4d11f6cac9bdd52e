//! Binary format structures
//!
//! Every record is `repr(C)` and written little-endian exactly as laid out
//! in memory. Variable-length regions are always preceded by a
//! [`ChunkHeader`] so readers can skip what they do not understand.

use std::mem::{offset_of, size_of};

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Current format version
pub const FILE_VERSION: u32 = 2;

/// Identifying tag prefix, followed by the ASCII version digit
pub const FILE_TAG_PREFIX: [u8; 3] = *b"RSL";

/// Identifying tag for [`FILE_VERSION`]: "RSL2"
pub const FILE_TAG: [u8; 4] = [
    FILE_TAG_PREFIX[0],
    FILE_TAG_PREFIX[1],
    FILE_TAG_PREFIX[2],
    b'0' + FILE_VERSION as u8,
];

/// File header size
pub const HEADER_SIZE: usize = 64;

/// Chunk header size
pub const CHUNK_HEADER_SIZE: usize = 8;

/// Stream info record size
pub const STREAM_INFO_SIZE: usize = 64;

/// Absolute position of [`FileHeader::first_frame_offset`]
pub const FIRST_FRAME_OFFSET_POS: u64 = offset_of!(FileHeader, first_frame_offset) as u64;

/// Position of [`StreamInfo::frame_count`] relative to the record start
pub const FRAME_COUNT_FIELD_OFFSET: u64 = offset_of!(StreamInfo, frame_count) as u64;

/// Chunk type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ChunkId {
    /// Device identification
    DeviceInfo = 1,
    /// One [`StreamInfo`] record per configured stream
    StreamInfo = 2,
    /// Device property list
    Properties = 3,
    /// Capability list
    Capabilities = 4,
    /// Recorder software version
    SoftwareInfo = 5,
    /// Sample envelope
    SampleInfo = 6,
    /// Sample payload
    SampleData = 7,
    /// Frame metadata, precedes the frame's payload
    FrameInfo = 8,
    /// Motion sensor intrinsics
    MotionIntrinsics = 9,
}

impl ChunkId {
    /// Decode a raw chunk tag, `None` for tags this version does not know
    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        let id = match value {
            1 => Self::DeviceInfo,
            2 => Self::StreamInfo,
            3 => Self::Properties,
            4 => Self::Capabilities,
            5 => Self::SoftwareInfo,
            6 => Self::SampleInfo,
            7 => Self::SampleData,
            8 => Self::FrameInfo,
            9 => Self::MotionIntrinsics,
            _ => return None,
        };
        Some(id)
    }
}

/// Coordinate system the device reports in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum CoordinateSystem {
    /// Rear-facing device, default
    #[default]
    RearDefault = 0,
    /// Rear-facing, OpenCV convention
    RearOpencv = 1,
    /// Front-facing, OpenCV convention
    FrontOpencv = 2,
}

impl CoordinateSystem {
    /// Decode a raw header value
    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::RearDefault),
            1 => Some(Self::RearOpencv),
            2 => Some(Self::FrontOpencv),
            _ => None,
        }
    }
}

/// File header (64 bytes)
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct FileHeader {
    /// Format version
    pub version: u32,

    /// "RSL" followed by the version digit
    pub id: [u8; 4],

    /// Raw [`CoordinateSystem`]
    pub coordinate_system: u32,

    /// Number of configured streams
    pub stream_count: u32,

    /// Position of the first streamed chunk, patched after metadata
    pub first_frame_offset: u32,

    /// Reserved for future use
    pub reserved: [u8; 44],
}

static_assertions::const_assert_eq!(size_of::<FileHeader>(), HEADER_SIZE);

impl FileHeader {
    /// Create a header with the first-frame offset still unresolved
    #[must_use]
    pub fn new(stream_count: u32, coordinate_system: CoordinateSystem) -> Self {
        Self {
            version: FILE_VERSION,
            id: FILE_TAG,
            coordinate_system: coordinate_system as u32,
            stream_count,
            first_frame_offset: 0,
            reserved: [0; 44],
        }
    }
}

/// Header preceding every record after the [`FileHeader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ChunkHeader {
    /// Raw [`ChunkId`]
    pub id: u32,

    /// Payload length in bytes, excluding this header
    pub size: u32,
}

static_assertions::const_assert_eq!(size_of::<ChunkHeader>(), CHUNK_HEADER_SIZE);

/// Device identification
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct DeviceInfo {
    /// NUL-padded device name
    pub name: [u8; 64],
    /// NUL-padded serial number
    pub serial: [u8; 32],
    /// NUL-padded firmware version
    pub firmware: [u8; 32],
    /// Mounting rotation in degrees
    pub rotation: u32,
    /// Reserved for future use
    pub reserved: [u8; 28],
}

static_assertions::const_assert_eq!(size_of::<DeviceInfo>(), 160);

impl Default for DeviceInfo {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl DeviceInfo {
    /// Build a device info record, truncating fields that do not fit
    #[must_use]
    pub fn new(name: &str, serial: &str, firmware: &str) -> Self {
        let mut info = Self::zeroed();
        copy_padded(&mut info.name, name);
        copy_padded(&mut info.serial, serial);
        copy_padded(&mut info.firmware, firmware);
        info
    }

    /// Device name without padding
    #[must_use]
    pub fn name(&self) -> String {
        read_padded(&self.name)
    }

    /// Serial number without padding
    #[must_use]
    pub fn serial(&self) -> String {
        read_padded(&self.serial)
    }
}

// Always leaves at least one trailing NUL.
fn copy_padded(dst: &mut [u8], src: &str) {
    let len = src.len().min(dst.len() - 1);
    dst[..len].copy_from_slice(&src.as_bytes()[..len]);
}

fn read_padded(src: &[u8]) -> String {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..end]).into_owned()
}

/// Recorder software version
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct SoftwareInfo {
    /// Major, minor, patch
    pub version: [u32; 3],
    /// Reserved for future use
    pub reserved: [u8; 52],
}

static_assertions::const_assert_eq!(size_of::<SoftwareInfo>(), 64);

impl SoftwareInfo {
    /// Version of this crate
    #[must_use]
    pub fn current() -> Self {
        let parse = |s: &str| s.parse::<u32>().unwrap_or(0);
        Self {
            version: [
                parse(env!("CARGO_PKG_VERSION_MAJOR")),
                parse(env!("CARGO_PKG_VERSION_MINOR")),
                parse(env!("CARGO_PKG_VERSION_PATCH")),
            ],
            reserved: [0; 52],
        }
    }
}

/// Intrinsics of a single motion sensor
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct MotionDeviceIntrinsics {
    /// Scale and bias matrix
    pub data: [[f32; 4]; 3],
    /// Per-axis noise variances
    pub noise_variances: [f32; 3],
    /// Per-axis bias variances
    pub bias_variances: [f32; 3],
}

/// Accelerometer and gyroscope intrinsics
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct MotionIntrinsics {
    /// Accelerometer
    pub accel: MotionDeviceIntrinsics,
    /// Gyroscope
    pub gyro: MotionDeviceIntrinsics,
}

static_assertions::const_assert_eq!(size_of::<MotionIntrinsics>(), 144);

/// A device option and its value at configuration time
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct DeviceProperty {
    /// Option identifier
    pub id: u32,
    /// Reserved
    pub reserved: u32,
    /// Option value
    pub value: f64,
}

static_assertions::const_assert_eq!(size_of::<DeviceProperty>(), 16);

/// Per-stream record inside the stream-info chunk (64 bytes)
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct StreamInfo {
    /// Raw stream identifier
    pub stream: u32,
    /// Raw pixel format
    pub format: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frames per second
    pub framerate: u32,
    /// Raw compression type applied to this stream's payloads
    pub compression: u32,
    /// Number of frames recorded, patched at finalization
    pub frame_count: u32,
    /// Reserved for future use
    pub reserved: [u8; 36],
}

static_assertions::const_assert_eq!(size_of::<StreamInfo>(), STREAM_INFO_SIZE);

/// Sample envelope record
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct SampleInfoRecord {
    /// Raw sample kind
    pub sample_type: u32,
    /// Reserved
    pub reserved: u32,
    /// Capture time
    pub capture_time: u64,
    /// File position of this record's chunk header
    pub offset: u64,
}

static_assertions::const_assert_eq!(size_of::<SampleInfoRecord>(), 24);

/// Frame metadata record
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct FrameInfo {
    /// Raw stream identifier
    pub stream: u32,
    /// Raw pixel format
    pub format: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per row
    pub stride: u32,
    /// Frames per second
    pub framerate: u32,
    /// Device frame number
    pub number: u64,
    /// Host system time
    pub system_time: u64,
    /// Device timestamp
    pub time_stamp: f64,
}

static_assertions::const_assert_eq!(size_of::<FrameInfo>(), 48);

/// Motion sample payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct MotionData {
    /// Raw motion sensor type (accelerometer, gyroscope)
    pub motion_type: u32,
    /// Device frame number
    pub frame_number: u32,
    /// Device timestamp
    pub timestamp: f64,
    /// Per-axis reading
    pub axes: [f32; 3],
    /// Reserved
    pub reserved: u32,
}

static_assertions::const_assert_eq!(size_of::<MotionData>(), 32);

/// Timestamp sample payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct TimestampData {
    /// Raw event source
    pub source: u32,
    /// Device frame number
    pub frame_number: u32,
    /// Device timestamp
    pub timestamp: f64,
}

static_assertions::const_assert_eq!(size_of::<TimestampData>(), 16);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_tag() {
        assert_eq!(&FILE_TAG, b"RSL2");
    }

    #[test]
    fn test_patch_positions() {
        assert_eq!(FIRST_FRAME_OFFSET_POS, 16);
        assert_eq!(FRAME_COUNT_FIELD_OFFSET, 24);
    }

    #[test]
    fn test_new_header() {
        let header = FileHeader::new(3, CoordinateSystem::RearOpencv);
        assert_eq!(header.version, FILE_VERSION);
        assert_eq!(header.id, FILE_TAG);
        assert_eq!(header.stream_count, 3);
        assert_eq!(header.coordinate_system, 1);
        assert_eq!(header.first_frame_offset, 0);
    }

    #[test]
    fn test_chunk_id_decode() {
        for raw in 1..=9 {
            let id = ChunkId::from_u32(raw).unwrap();
            assert_eq!(id as u32, raw);
        }
        assert!(ChunkId::from_u32(0).is_none());
        assert!(ChunkId::from_u32(42).is_none());
    }

    #[test]
    fn test_device_info_padding() {
        let info = DeviceInfo::new("Depth Camera", "0123456789", "5.8.15");
        assert_eq!(info.name(), "Depth Camera");
        assert_eq!(info.serial(), "0123456789");

        let long = "x".repeat(100);
        let info = DeviceInfo::new(&long, "", "");
        assert_eq!(info.name().len(), 63);
        assert_eq!(info.serial(), "");
    }
}
