//! Container file reader
//!
//! Walks the file using chunk framing only, so chunks with unknown tags are
//! skipped rather than rejected.

use std::fs::File;
use std::mem::size_of;
use std::path::Path;

use bytemuck::{pod_read_unaligned, Pod};
use memmap2::Mmap;

use super::format::{
    ChunkHeader, ChunkId, FileHeader, FrameInfo, SampleInfoRecord, StreamInfo, CHUNK_HEADER_SIZE,
    HEADER_SIZE, STREAM_INFO_SIZE,
};
use crate::{RecorderError, Result};

/// Reader for container files
pub struct ContainerReader {
    _file: File,
    mmap: Mmap,
    header: FileHeader,
}

/// One chunk located by its framing
#[derive(Debug, Clone, Copy)]
pub struct RawChunk<'a> {
    /// Position of the chunk header
    pub offset: u64,
    /// Raw tag
    pub id: u32,
    /// Payload
    pub data: &'a [u8],
}

impl RawChunk<'_> {
    /// Decoded tag, `None` if unknown to this version
    #[must_use]
    pub fn kind(&self) -> Option<ChunkId> {
        ChunkId::from_u32(self.id)
    }
}

/// A sample group from the streamed region
#[derive(Debug, Clone, Copy)]
pub struct RecordedSample<'a> {
    /// Sample envelope
    pub info: SampleInfoRecord,
    /// Frame metadata, for frame samples
    pub frame: Option<FrameInfo>,
    /// Payload as stored, possibly compressed
    pub data: &'a [u8],
}

/// Iterator over chunk boundaries
pub struct Chunks<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Result<RawChunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.bytes.len() {
            return None;
        }

        let start = self.position;
        // Any error ends iteration.
        self.position = self.bytes.len();

        if start + CHUNK_HEADER_SIZE > self.bytes.len() {
            return Some(Err(RecorderError::InvalidFormat(format!(
                "Truncated chunk header at offset {start}"
            ))));
        }

        let header: ChunkHeader =
            pod_read_unaligned(&self.bytes[start..start + CHUNK_HEADER_SIZE]);
        let data_start = start + CHUNK_HEADER_SIZE;
        let data_end = data_start + header.size as usize;

        if data_end > self.bytes.len() {
            return Some(Err(RecorderError::InvalidFormat(format!(
                "Chunk at offset {start} extends beyond file: {data_end} > {}",
                self.bytes.len()
            ))));
        }

        self.position = data_end;
        Some(Ok(RawChunk {
            offset: start as u64,
            id: header.id,
            data: &self.bytes[data_start..data_end],
        }))
    }
}

impl ContainerReader {
    /// Open an existing container file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be opened, mapped, or is invalid
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < HEADER_SIZE {
            return Err(RecorderError::InvalidFormat(
                "File too small to contain header".to_string(),
            ));
        }

        let header: FileHeader = pod_read_unaligned(&mmap[..HEADER_SIZE]);
        super::validate_header(&header)?;

        Ok(Self {
            _file: file,
            mmap,
            header,
        })
    }

    /// File header
    #[must_use]
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Iterate every chunk after the header
    #[must_use]
    pub fn chunks(&self) -> Chunks<'_> {
        Chunks {
            bytes: &self.mmap,
            position: HEADER_SIZE,
        }
    }

    /// Decode the stream-info records
    ///
    /// # Errors
    ///
    /// Returns error if the chunk is missing or malformed
    pub fn stream_infos(&self) -> Result<Vec<StreamInfo>> {
        for chunk in self.chunks() {
            let chunk = chunk?;
            if chunk.kind() != Some(ChunkId::StreamInfo) {
                continue;
            }

            if chunk.data.len() % STREAM_INFO_SIZE != 0 {
                return Err(RecorderError::InvalidFormat(format!(
                    "Stream info chunk of {} bytes is not a whole number of records",
                    chunk.data.len()
                )));
            }

            return Ok(chunk
                .data
                .chunks_exact(STREAM_INFO_SIZE)
                .map(pod_read_unaligned)
                .collect());
        }

        Err(RecorderError::InvalidFormat(
            "Missing stream info chunk".to_string(),
        ))
    }

    /// Collect the streamed sample groups in file order
    ///
    /// # Errors
    ///
    /// Returns error if the chunk stream is malformed
    pub fn samples(&self) -> Result<Vec<RecordedSample<'_>>> {
        let mut samples = Vec::new();
        let mut current: Option<(SampleInfoRecord, Option<FrameInfo>)> = None;

        for chunk in self.chunks() {
            let chunk = chunk?;
            match chunk.kind() {
                Some(ChunkId::SampleInfo) => current = Some((read_record(chunk.data)?, None)),
                Some(ChunkId::FrameInfo) => {
                    if let Some((_, frame)) = current.as_mut() {
                        *frame = Some(read_record(chunk.data)?);
                    }
                }
                Some(ChunkId::SampleData) => {
                    if let Some((info, frame)) = current.take() {
                        samples.push(RecordedSample {
                            info,
                            frame,
                            data: chunk.data,
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(samples)
    }
}

fn read_record<T: Pod>(data: &[u8]) -> Result<T> {
    if data.len() != size_of::<T>() {
        return Err(RecorderError::InvalidFormat(format!(
            "Record of {} bytes, expected {}",
            data.len(),
            size_of::<T>()
        )));
    }
    Ok(pod_read_unaligned(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{decompress, CompressionLevel, CompressionType, Encoder};
    use crate::config::StreamConfig;
    use crate::sample::{Frame, PixelFormat, Sample, StreamKind};
    use crate::storage::{
        ContainerWriter, CoordinateSystem, DeviceInfo, MotionData, MotionIntrinsics,
        TimestampData,
    };
    use bytes::Bytes;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn color_stream() -> StreamConfig {
        StreamConfig {
            stream: StreamKind::Color,
            format: PixelFormat::Rgb8,
            width: 8,
            height: 4,
            framerate: 30,
            compression: None,
        }
    }

    fn write_recording(path: &Path) {
        let mut writer = ContainerWriter::create(path, Encoder::default()).unwrap();
        writer.write_header(1, CoordinateSystem::FrontOpencv).unwrap();
        writer
            .write_device_info(&DeviceInfo::new("cam", "1", "fw"))
            .unwrap();
        writer.write_software_info().unwrap();
        writer.write_capabilities(&[7]).unwrap();
        writer
            .write_motion_intrinsics(&MotionIntrinsics::default())
            .unwrap();
        writer
            .write_stream_info(&[color_stream()], CompressionLevel::Medium)
            .unwrap();
        writer.write_properties(&[]).unwrap();
        writer.write_first_frame_offset().unwrap();

        let frame = Frame {
            stream: StreamKind::Color,
            format: PixelFormat::Rgb8,
            width: 8,
            height: 4,
            stride: 24,
            framerate: 30,
            number: 1,
            system_time: 99,
            time_stamp: 1.5,
            data: Bytes::from(vec![0xAB; 96]),
        };
        writer.write_sample(&mut Sample::frame(10, frame)).unwrap();
        writer
            .write_sample(&mut Sample::motion(11, MotionData::default()))
            .unwrap();
        writer
            .write_sample(&mut Sample::timestamp(12, TimestampData::default()))
            .unwrap();
        writer.finalize().unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_roundtrip() {
        let file = NamedTempFile::new().unwrap();
        write_recording(file.path());

        let reader = ContainerReader::open(file.path()).unwrap();
        assert_eq!(reader.header().stream_count, 1);
        assert_eq!(reader.header().coordinate_system, 2);

        let samples = reader.samples().unwrap();
        assert_eq!(samples.len(), 3);

        let frame = samples[0].frame.unwrap();
        assert_eq!(frame.number, 1);
        assert_eq!(frame.system_time, 99);
        assert_eq!(
            decompress(CompressionType::Lz4, samples[0].data).unwrap(),
            vec![0xAB; 96]
        );

        assert_eq!(samples[1].info.capture_time, 11);
        assert!(samples[1].frame.is_none());
        assert_eq!(samples[1].data.len(), size_of::<MotionData>());
        assert_eq!(samples[2].data.len(), size_of::<TimestampData>());
    }

    #[test]
    fn test_first_sample_at_first_frame_offset() {
        let file = NamedTempFile::new().unwrap();
        write_recording(file.path());

        let reader = ContainerReader::open(file.path()).unwrap();
        let samples = reader.samples().unwrap();
        assert_eq!(
            samples[0].info.offset,
            u64::from(reader.header().first_frame_offset)
        );
    }

    #[test]
    fn test_metadata_chunk_order() {
        let file = NamedTempFile::new().unwrap();
        write_recording(file.path());

        let reader = ContainerReader::open(file.path()).unwrap();
        let kinds: Vec<ChunkId> = reader
            .chunks()
            .take(6)
            .map(|c| c.unwrap().kind().unwrap())
            .collect();
        assert_eq!(
            kinds,
            vec![
                ChunkId::DeviceInfo,
                ChunkId::SoftwareInfo,
                ChunkId::Capabilities,
                ChunkId::MotionIntrinsics,
                ChunkId::StreamInfo,
                ChunkId::Properties,
            ]
        );
    }

    #[test]
    fn test_unknown_chunks_are_skipped() {
        let file = NamedTempFile::new().unwrap();
        write_recording(file.path());

        let known = ContainerReader::open(file.path())
            .unwrap()
            .samples()
            .unwrap()
            .len();

        let mut handle = std::fs::OpenOptions::new()
            .append(true)
            .open(file.path())
            .unwrap();
        handle.write_all(&0xBEEF_u32.to_le_bytes()).unwrap();
        handle.write_all(&5u32.to_le_bytes()).unwrap();
        handle.write_all(b"hello").unwrap();
        drop(handle);

        let reader = ContainerReader::open(file.path()).unwrap();
        let last = reader.chunks().last().unwrap().unwrap();
        assert_eq!(last.id, 0xBEEF);
        assert!(last.kind().is_none());
        assert_eq!(last.data, b"hello");
        assert_eq!(reader.samples().unwrap().len(), known);
    }

    #[test]
    fn test_truncated_chunk_is_error() {
        let file = NamedTempFile::new().unwrap();
        write_recording(file.path());

        let len = std::fs::metadata(file.path()).unwrap().len();
        std::fs::OpenOptions::new()
            .write(true)
            .open(file.path())
            .unwrap()
            .set_len(len - 3)
            .unwrap();

        let reader = ContainerReader::open(file.path()).unwrap();
        assert!(reader.chunks().any(|c| c.is_err()));
    }

    #[test]
    fn test_rejects_bad_tag() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0u8; HEADER_SIZE]).unwrap();
        assert!(ContainerReader::open(file.path()).is_err());
    }
}
