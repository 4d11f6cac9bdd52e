//! Container file writer

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytemuck::{bytes_of, cast_slice};
use tracing::{debug, error, info, trace};

use super::format::{
    ChunkHeader, ChunkId, CoordinateSystem, DeviceInfo, DeviceProperty, FileHeader,
    MotionIntrinsics, SampleInfoRecord, SoftwareInfo, StreamInfo, FIRST_FRAME_OFFSET_POS,
    FRAME_COUNT_FIELD_OFFSET, STREAM_INFO_SIZE,
};
use crate::compression::{CompressionLevel, CompressionType, Encoder};
use crate::config::StreamConfig;
use crate::sample::{Frame, Sample, SamplePayload, StreamKind};
use crate::{RecorderError, Result};

/// Writer for container files
///
/// Metadata is written once, in order, through the `write_*` methods; samples
/// are then appended with [`ContainerWriter::write_sample`]. Fields whose
/// value is only known at the end are reserved with a placeholder and their
/// positions kept in a side table until [`ContainerWriter::finalize`].
pub struct ContainerWriter {
    file: Option<BufWriter<File>>,
    path: PathBuf,
    position: u64,
    encoder: Encoder,
    /// Absolute position of each stream's `frame_count` field
    frame_count_offsets: BTreeMap<StreamKind, u64>,
    frame_counts: BTreeMap<StreamKind, u32>,
    /// Set when a failed sample could not be rolled back
    poisoned: bool,
}

impl ContainerWriter {
    /// Create a new container file, truncating any existing one
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created
    pub fn create(path: &Path, encoder: Encoder) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        debug!("Created container file {}", path.display());

        Ok(Self {
            file: Some(BufWriter::new(file)),
            path: path.to_path_buf(),
            position: 0,
            encoder,
            frame_count_offsets: BTreeMap::new(),
            frame_counts: BTreeMap::new(),
            poisoned: false,
        })
    }

    /// Path of the container file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current write position
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Frames written so far, per stream
    #[must_use]
    pub fn frame_counts(&self) -> &BTreeMap<StreamKind, u32> {
        &self.frame_counts
    }

    /// Write the file header at offset 0
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub fn write_header(
        &mut self,
        stream_count: u32,
        coordinate_system: CoordinateSystem,
    ) -> Result<()> {
        let header = FileHeader::new(stream_count, coordinate_system);
        self.seek_to(0)?;
        self.write_bytes(bytes_of(&header))?;
        info!("Wrote header, {} streams", stream_count);
        Ok(())
    }

    /// Write the device-info chunk
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub fn write_device_info(&mut self, device: &DeviceInfo) -> Result<()> {
        self.write_chunk(ChunkId::DeviceInfo, bytes_of(device))?;
        info!("Wrote device info chunk for '{}'", device.name());
        Ok(())
    }

    /// Write the software-info chunk
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub fn write_software_info(&mut self) -> Result<()> {
        let software = SoftwareInfo::current();
        self.write_chunk(ChunkId::SoftwareInfo, bytes_of(&software))?;
        info!("Wrote software info chunk, version {:?}", software.version);
        Ok(())
    }

    /// Write the capabilities chunk
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub fn write_capabilities(&mut self, capabilities: &[u32]) -> Result<()> {
        self.write_chunk(ChunkId::Capabilities, cast_slice(capabilities))?;
        info!("Wrote capabilities chunk, {} entries", capabilities.len());
        Ok(())
    }

    /// Write the motion-intrinsics chunk
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub fn write_motion_intrinsics(&mut self, intrinsics: &MotionIntrinsics) -> Result<()> {
        self.write_chunk(ChunkId::MotionIntrinsics, bytes_of(intrinsics))?;
        info!("Wrote motion intrinsics chunk");
        Ok(())
    }

    /// Write the stream-info chunk, one record per stream in stream order
    ///
    /// Binds each stream's codec and reserves its frame-count field.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub fn write_stream_info(
        &mut self,
        streams: &[StreamConfig],
        level: CompressionLevel,
    ) -> Result<()> {
        let mut sorted: Vec<&StreamConfig> = streams.iter().collect();
        sorted.sort_by_key(|s| s.stream);

        self.write_chunk_header(ChunkId::StreamInfo, sorted.len() * STREAM_INFO_SIZE)?;

        for profile in sorted {
            self.encoder.add_codec(profile.stream, profile.format, level);

            let record = StreamInfo {
                stream: profile.stream as u32,
                format: profile.format as u32,
                width: profile.width,
                height: profile.height,
                framerate: profile.framerate,
                compression: self.encoder.compression_policy(profile.stream, profile.format)
                    as u32,
                frame_count: 0,
                reserved: [0; 36],
            };

            self.frame_count_offsets
                .insert(profile.stream, self.position + FRAME_COUNT_FIELD_OFFSET);
            self.write_bytes(bytes_of(&record))?;

            info!(
                "Wrote stream info for {:?}: {}x{} @ {} fps",
                profile.stream, profile.width, profile.height, profile.framerate
            );
        }

        Ok(())
    }

    /// Write the properties chunk
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub fn write_properties(&mut self, properties: &[DeviceProperty]) -> Result<()> {
        self.write_chunk(ChunkId::Properties, cast_slice(properties))?;
        info!("Wrote properties chunk, {} entries", properties.len());
        Ok(())
    }

    /// Patch the header with the current position, where streaming begins
    ///
    /// # Errors
    ///
    /// Returns error if the position does not fit the field or the write fails
    pub fn write_first_frame_offset(&mut self) -> Result<()> {
        let offset = u32::try_from(self.position).map_err(|_| {
            RecorderError::InvalidFormat(format!(
                "First frame offset {} exceeds header field",
                self.position
            ))
        })?;
        self.patch_u32(FIRST_FRAME_OFFSET_POS, offset)?;
        info!("First frame offset {}", offset);
        Ok(())
    }

    /// Append one sample: its sample-info chunk, then its payload chunks
    ///
    /// Assigns the sample's file offset. A sample that fails partway is cut
    /// back off the file, so the chunk stream stays well formed and later
    /// offsets stay exact. If that rollback itself fails, every further
    /// sample is refused.
    ///
    /// # Errors
    ///
    /// Returns error if a write fails, if a frame's stream requires a codec
    /// that was never bound, or if an earlier rollback failed
    pub fn write_sample(&mut self, sample: &mut Sample) -> Result<()> {
        if self.poisoned {
            return Err(RecorderError::InvalidState(format!(
                "{} is no longer writable after a failed rollback",
                self.path.display()
            )));
        }

        let start = self.position;
        let result = self.append_sample(sample, start);
        if result.is_err() {
            if let Err(e) = self.truncate_to(start) {
                self.poisoned = true;
                error!("Failed to roll back partial sample at {}: {}", start, e);
            }
        }
        result
    }

    fn append_sample(&mut self, sample: &mut Sample, start: u64) -> Result<()> {
        sample.set_offset(start);

        let record = SampleInfoRecord {
            sample_type: sample.kind() as u32,
            reserved: 0,
            capture_time: sample.capture_time,
            offset: start,
        };
        self.write_chunk(ChunkId::SampleInfo, bytes_of(&record))?;

        match &sample.payload {
            SamplePayload::Frame(frame) => self.write_frame(frame)?,
            SamplePayload::Motion(motion) => {
                self.write_chunk(ChunkId::SampleData, bytes_of(motion))?;
                trace!("Wrote motion, capture time {}", sample.capture_time);
            }
            SamplePayload::Timestamp(timestamp) => {
                self.write_chunk(ChunkId::SampleData, bytes_of(timestamp))?;
                trace!("Wrote timestamp, capture time {}", sample.capture_time);
            }
        }

        Ok(())
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_chunk(ChunkId::FrameInfo, bytes_of(&frame.info()))?;

        // Payload is trusted to be stride * height bytes.
        match self.encoder.compression_policy(frame.stream, frame.format) {
            CompressionType::None => self.write_chunk(ChunkId::SampleData, &frame.data)?,
            _ => {
                let encoded = self.encoder.encode(frame, &frame.data)?;
                self.write_chunk(ChunkId::SampleData, &encoded)?;
            }
        }

        *self.frame_counts.entry(frame.stream).or_insert(0) += 1;
        trace!(
            "Wrote frame {} of {:?}, system time {}, time stamp {}",
            frame.number,
            frame.stream,
            frame.system_time,
            frame.time_stamp
        );

        Ok(())
    }

    /// Patch every reserved frame-count field with the final count
    ///
    /// # Errors
    ///
    /// Returns error if a write fails
    pub fn finalize(&mut self) -> Result<()> {
        let patches: Vec<(StreamKind, u64, u32)> = self
            .frame_count_offsets
            .iter()
            .filter_map(|(stream, offset)| {
                self.frame_counts
                    .get(stream)
                    .map(|count| (*stream, *offset, *count))
            })
            .collect();

        for (stream, offset, count) in patches {
            self.patch_u32(offset, count)?;
            info!("Stream {:?}: {} frames", stream, count);
        }

        Ok(())
    }

    /// Flush and close the file. Safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns error if flushing fails
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.get_ref().sync_all()?;
            debug!("Closed container file {}", self.path.display());
        }
        Ok(())
    }

    /// Whether [`ContainerWriter::close`] has run
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn file(&mut self) -> Result<&mut BufWriter<File>> {
        self.file
            .as_mut()
            .ok_or_else(|| RecorderError::InvalidState("container file is closed".to_string()))
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.file()?.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    fn write_chunk_header(&mut self, id: ChunkId, size: usize) -> Result<()> {
        let size = u32::try_from(size).map_err(|_| {
            RecorderError::InvalidFormat(format!("Chunk {id:?} of {size} bytes is too large"))
        })?;
        let header = ChunkHeader {
            id: id as u32,
            size,
        };
        self.write_bytes(bytes_of(&header))
    }

    fn write_chunk(&mut self, id: ChunkId, payload: &[u8]) -> Result<()> {
        self.write_chunk_header(id, payload.len())?;
        self.write_bytes(payload)
    }

    fn seek_to(&mut self, position: u64) -> Result<()> {
        self.file()?.seek(SeekFrom::Start(position))?;
        self.position = position;
        Ok(())
    }

    /// Drop everything written after `position`
    fn truncate_to(&mut self, position: u64) -> Result<()> {
        let file = self.file()?;
        file.flush()?;
        file.get_ref().set_len(position)?;
        file.seek(SeekFrom::Start(position))?;
        self.position = position;
        Ok(())
    }

    fn patch_u32(&mut self, position: u64, value: u32) -> Result<()> {
        let end = self.position;
        let file = self.file()?;
        file.seek(SeekFrom::Start(position))?;
        file.write_all(&value.to_le_bytes())?;
        file.seek(SeekFrom::Start(end))?;
        Ok(())
    }
}
