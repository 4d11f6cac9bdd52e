//! Chunked binary container format

mod format;
mod reader;
mod writer;

pub use format::{
    ChunkHeader, ChunkId, CoordinateSystem, DeviceInfo, DeviceProperty, FileHeader, FrameInfo,
    MotionData, MotionDeviceIntrinsics, MotionIntrinsics, SampleInfoRecord, SoftwareInfo,
    StreamInfo, TimestampData, CHUNK_HEADER_SIZE, FILE_TAG, FILE_TAG_PREFIX, FILE_VERSION,
    FIRST_FRAME_OFFSET_POS, FRAME_COUNT_FIELD_OFFSET, HEADER_SIZE, STREAM_INFO_SIZE,
};
pub use reader::{Chunks, ContainerReader, RawChunk, RecordedSample};
pub use writer::ContainerWriter;

use crate::Result;

/// Validate container tag and version
///
/// # Errors
///
/// Returns error if tag or version is invalid
pub fn validate_header(header: &FileHeader) -> Result<()> {
    if header.id[..3] != FILE_TAG_PREFIX {
        return Err(crate::RecorderError::InvalidFormat(format!(
            "Invalid tag: expected {:?}, got {:?}",
            FILE_TAG, header.id
        )));
    }

    if header.version != FILE_VERSION || header.id != FILE_TAG {
        return Err(crate::RecorderError::InvalidFormat(format!(
            "Unsupported version: {}, expected {}",
            header.version, FILE_VERSION
        )));
    }

    Ok(())
}
