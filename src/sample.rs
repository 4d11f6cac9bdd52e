//! Sensor samples handed to the recorder

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::storage::{FrameInfo, MotionData, TimestampData};

/// Logical image stream of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum StreamKind {
    /// Depth
    Depth = 0,
    /// Color
    Color = 1,
    /// First infrared imager
    Infrared = 2,
    /// Second infrared imager
    Infrared2 = 3,
    /// Wide field-of-view tracking camera
    Fisheye = 4,
}

impl StreamKind {
    /// Decode a raw stream identifier
    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Depth),
            1 => Some(Self::Color),
            2 => Some(Self::Infrared),
            3 => Some(Self::Infrared2),
            4 => Some(Self::Fisheye),
            _ => None,
        }
    }
}

/// Pixel layout of a frame payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum PixelFormat {
    /// Unspecified
    Any = 0,
    /// 16-bit depth
    Z16 = 1,
    /// 16-bit disparity
    Disparity16 = 2,
    /// Packed YUV 4:2:2
    Yuyv = 3,
    /// 24-bit RGB
    Rgb8 = 4,
    /// 24-bit BGR
    Bgr8 = 5,
    /// 32-bit RGBA
    Rgba8 = 6,
    /// 32-bit BGRA
    Bgra8 = 7,
    /// 8-bit luminance
    Y8 = 8,
    /// 16-bit luminance
    Y16 = 9,
    /// Packed 10-bit raw
    Raw10 = 10,
}

impl PixelFormat {
    /// Decode a raw pixel format
    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        let format = match value {
            0 => Self::Any,
            1 => Self::Z16,
            2 => Self::Disparity16,
            3 => Self::Yuyv,
            4 => Self::Rgb8,
            5 => Self::Bgr8,
            6 => Self::Rgba8,
            7 => Self::Bgra8,
            8 => Self::Y8,
            9 => Self::Y16,
            10 => Self::Raw10,
            _ => return None,
        };
        Some(format)
    }

    /// Bytes per row of a tightly packed image `width` pixels wide
    #[must_use]
    pub fn min_stride(self, width: u32) -> u32 {
        match self {
            Self::Any | Self::Y8 => width,
            Self::Z16 | Self::Disparity16 | Self::Yuyv | Self::Y16 => width * 2,
            Self::Rgb8 | Self::Bgr8 => width * 3,
            Self::Rgba8 | Self::Bgra8 => width * 4,
            Self::Raw10 => width * 5 / 4,
        }
    }
}

/// Sample discriminant as stored in the sample-info chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SampleKind {
    /// Image frame
    Frame = 0,
    /// Motion reading
    Motion = 1,
    /// Timestamp event
    Timestamp = 2,
}

impl SampleKind {
    /// Decode a raw sample kind
    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Frame),
            1 => Some(Self::Motion),
            2 => Some(Self::Timestamp),
            _ => None,
        }
    }
}

/// One image frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Source stream
    pub stream: StreamKind,
    /// Pixel layout
    pub format: PixelFormat,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per row
    pub stride: u32,
    /// Stream frame rate at capture
    pub framerate: u32,
    /// Device frame number
    pub number: u64,
    /// Host system time
    pub system_time: u64,
    /// Device timestamp
    pub time_stamp: f64,
    /// Raw pixels, `stride * height` bytes
    pub data: Bytes,
}

impl Frame {
    /// Metadata record written ahead of the payload
    #[must_use]
    pub fn info(&self) -> FrameInfo {
        FrameInfo {
            stream: self.stream as u32,
            format: self.format as u32,
            width: self.width,
            height: self.height,
            stride: self.stride,
            framerate: self.framerate,
            number: self.number,
            system_time: self.system_time,
            time_stamp: self.time_stamp,
        }
    }

    /// Expected payload length
    #[must_use]
    pub fn expected_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }
}

/// Variant-specific sample payload
#[derive(Debug, Clone)]
pub enum SamplePayload {
    /// Image frame
    Frame(Frame),
    /// Motion reading
    Motion(MotionData),
    /// Timestamp event
    Timestamp(TimestampData),
}

/// A sample with its common envelope
#[derive(Debug, Clone)]
pub struct Sample {
    /// Capture time
    pub capture_time: u64,
    offset: Option<u64>,
    /// Payload
    pub payload: SamplePayload,
}

impl Sample {
    /// Wrap a frame
    #[must_use]
    pub fn frame(capture_time: u64, frame: Frame) -> Self {
        Self::new(capture_time, SamplePayload::Frame(frame))
    }

    /// Wrap a motion reading
    #[must_use]
    pub fn motion(capture_time: u64, data: MotionData) -> Self {
        Self::new(capture_time, SamplePayload::Motion(data))
    }

    /// Wrap a timestamp event
    #[must_use]
    pub fn timestamp(capture_time: u64, data: TimestampData) -> Self {
        Self::new(capture_time, SamplePayload::Timestamp(data))
    }

    fn new(capture_time: u64, payload: SamplePayload) -> Self {
        Self {
            capture_time,
            offset: None,
            payload,
        }
    }

    /// Sample discriminant
    #[must_use]
    pub fn kind(&self) -> SampleKind {
        match self.payload {
            SamplePayload::Frame(_) => SampleKind::Frame,
            SamplePayload::Motion(_) => SampleKind::Motion,
            SamplePayload::Timestamp(_) => SampleKind::Timestamp,
        }
    }

    /// Source stream for frames
    #[must_use]
    pub fn stream(&self) -> Option<StreamKind> {
        match &self.payload {
            SamplePayload::Frame(frame) => Some(frame.stream),
            _ => None,
        }
    }

    /// File position of the sample-info chunk, once written
    #[must_use]
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// Assign the file position. Only the container writer calls this,
    /// exactly once per sample.
    pub(crate) fn set_offset(&mut self, offset: u64) {
        debug_assert!(self.offset.is_none(), "sample offset assigned twice");
        self.offset = Some(offset);
    }
}
