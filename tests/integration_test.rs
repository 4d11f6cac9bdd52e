//! End-to-end tests for the record pipeline

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytemuck::pod_read_unaligned;
use bytes::Bytes;
use tempfile::TempDir;

use rslrec::compression::{decompress, CompressionType};
use rslrec::config::{DeviceMetadata, RecorderConfig, StreamConfig};
use rslrec::recording::Recorder;
use rslrec::sample::{Frame, PixelFormat, Sample, SampleKind, StreamKind};
use rslrec::storage::{
    ChunkHeader, ChunkId, ContainerReader, DeviceInfo, DeviceProperty, MotionData,
    CHUNK_HEADER_SIZE, HEADER_SIZE,
};

fn stream_config(stream: StreamKind, framerate: u32) -> StreamConfig {
    StreamConfig {
        stream,
        format: PixelFormat::Z16,
        width: 16,
        height: 8,
        framerate,
        compression: None,
    }
}

/// Frame with a compressible gradient payload
fn frame(stream: StreamKind, framerate: u32, number: u64) -> Sample {
    let data: Vec<u8> = (0..16u16 * 8)
        .flat_map(|i| (i / 4 + number as u16).to_le_bytes())
        .collect();
    Sample::frame(
        number * 1_000,
        Frame {
            stream,
            format: PixelFormat::Z16,
            width: 16,
            height: 8,
            stride: 32,
            framerate,
            number,
            system_time: number * 1_000,
            time_stamp: number as f64,
            data: Bytes::from(data),
        },
    )
}

fn motion(capture_time: u64) -> Sample {
    Sample::motion(
        capture_time,
        MotionData {
            frame_number: capture_time as u32,
            axes: [0.0, -9.81, 0.0],
            ..MotionData::default()
        },
    )
}

fn wait_until_written(recorder: &Recorder) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let stats = recorder.stats();
        if stats.queued == 0 && stats.written + stats.write_errors == stats.accepted {
            return;
        }
        assert!(Instant::now() < deadline, "writer did not drain: {stats:?}");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_rate_aware_dropping_with_mixed_rates() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mixed.rsl");
    let config = RecorderConfig::new(
        &path,
        vec![
            stream_config(StreamKind::Depth, 30),
            stream_config(StreamKind::Color, 60),
        ],
    );

    let recorder = Recorder::new();
    recorder
        .configure(&config, &DeviceMetadata::default())
        .unwrap();

    // Writer not running yet, so nothing leaves the queue.
    for number in 0..40 {
        recorder.record_sample(frame(StreamKind::Color, 60, number));
    }

    let stats = recorder.stats();
    assert_eq!(stats.accepted, 11);
    assert_eq!(stats.dropped, 29);
    assert_eq!(recorder.in_flight(StreamKind::Color), 11);

    recorder.start().unwrap();
    wait_until_written(&recorder);
    recorder.stop().unwrap();
    assert_eq!(recorder.in_flight(StreamKind::Color), 0);

    let counts = recorder.frame_counts().unwrap();
    assert_eq!(counts[&StreamKind::Color], 11);

    let reader = ContainerReader::open(&path).unwrap();
    let infos = reader.stream_infos().unwrap();
    let count_of = |stream: StreamKind| {
        infos
            .iter()
            .find(|info| info.stream == stream as u32)
            .map(|info| info.frame_count)
            .unwrap()
    };
    assert_eq!(count_of(StreamKind::Color), 11);
    assert_eq!(count_of(StreamKind::Depth), 0);

    let numbers: Vec<u64> = reader
        .samples()
        .unwrap()
        .iter()
        .map(|s| s.frame.unwrap().number)
        .collect();
    assert_eq!(numbers, (0..11).collect::<Vec<_>>());
}

#[test]
fn test_samples_written_in_arrival_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("order.rsl");
    let config = RecorderConfig::new(&path, vec![stream_config(StreamKind::Depth, 30)]);

    let recorder = Recorder::new();
    recorder
        .configure(&config, &DeviceMetadata::default())
        .unwrap();
    recorder.start().unwrap();

    for number in 0..20 {
        recorder.record_sample(frame(StreamKind::Depth, 30, number));
        recorder.record_sample(motion(number * 1_000 + 1));
        wait_until_written(&recorder);
    }
    recorder.stop().unwrap();

    let reader = ContainerReader::open(&path).unwrap();
    let samples = reader.samples().unwrap();
    assert_eq!(samples.len(), 40);
    assert_eq!(
        samples[0].info.offset,
        u64::from(reader.header().first_frame_offset)
    );

    for pair in samples.windows(2) {
        assert!(pair[0].info.offset < pair[1].info.offset);
        assert!(pair[0].info.capture_time < pair[1].info.capture_time);
    }

    for (i, sample) in samples.iter().enumerate() {
        let expected = if i % 2 == 0 {
            SampleKind::Frame
        } else {
            SampleKind::Motion
        };
        assert_eq!(SampleKind::from_u32(sample.info.sample_type), Some(expected));
        assert_eq!(sample.frame.is_some(), expected == SampleKind::Frame);
    }
}

#[test]
fn test_pause_drops_input_until_resumed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pause.rsl");
    let config = RecorderConfig::new(&path, vec![stream_config(StreamKind::Depth, 30)]);

    let recorder = Recorder::new();
    recorder
        .configure(&config, &DeviceMetadata::default())
        .unwrap();
    recorder.start().unwrap();

    recorder.set_pause(true);
    for number in 0..5 {
        recorder.record_sample(frame(StreamKind::Depth, 30, number));
    }
    assert_eq!(recorder.stats().accepted, 0);

    recorder.set_pause(false);
    assert!(!recorder.is_paused());
    recorder.record_sample(frame(StreamKind::Depth, 30, 5));
    wait_until_written(&recorder);
    recorder.stop().unwrap();

    let reader = ContainerReader::open(&path).unwrap();
    let samples = reader.samples().unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].frame.unwrap().number, 5);
}

#[test]
fn test_concurrent_producers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("concurrent.rsl");
    let config = RecorderConfig::new(&path, vec![stream_config(StreamKind::Depth, 30)]);

    let recorder = Arc::new(Recorder::new());
    recorder
        .configure(&config, &DeviceMetadata::default())
        .unwrap();
    recorder.start().unwrap();

    let producers: Vec<_> = (0..4u64)
        .map(|producer| {
            let recorder = Arc::clone(&recorder);
            thread::spawn(move || {
                for i in 0..100 {
                    recorder.record_sample(motion(producer * 10_000 + i));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    wait_until_written(&recorder);
    recorder.stop().unwrap();
    assert_eq!(recorder.stats().accepted, 400);
    assert_eq!(recorder.stats().write_errors, 0);

    let reader = ContainerReader::open(&path).unwrap();
    let samples = reader.samples().unwrap();
    assert_eq!(samples.len(), 400);

    // Each producer's samples keep their relative order.
    for producer in 0..4u64 {
        let times: Vec<u64> = samples
            .iter()
            .map(|s| s.info.capture_time)
            .filter(|t| t / 10_000 == producer)
            .collect();
        assert_eq!(times.len(), 100);
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn test_chunk_framing_covers_whole_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("framing.rsl");
    let config = RecorderConfig::new(
        &path,
        vec![
            stream_config(StreamKind::Depth, 30),
            stream_config(StreamKind::Infrared, 30),
        ],
    );
    let metadata = DeviceMetadata {
        info: DeviceInfo::new("Depth Camera", "0042", "5.12.7"),
        capabilities: vec![1, 3],
        properties: vec![DeviceProperty {
            id: 7,
            value: 1.5,
            ..DeviceProperty::default()
        }],
        ..DeviceMetadata::default()
    };

    let recorder = Recorder::new();
    recorder.configure(&config, &metadata).unwrap();
    recorder.start().unwrap();
    for number in 0..3 {
        recorder.record_sample(frame(StreamKind::Depth, 30, number));
        recorder.record_sample(frame(StreamKind::Infrared, 30, number));
        recorder.record_sample(motion(number));
    }
    wait_until_written(&recorder);
    recorder.stop().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let mut position = HEADER_SIZE;
    let mut ids = Vec::new();
    while position < bytes.len() {
        let header: ChunkHeader =
            pod_read_unaligned(&bytes[position..position + CHUNK_HEADER_SIZE]);
        ids.push(ChunkId::from_u32(header.id).unwrap());
        position += CHUNK_HEADER_SIZE + header.size as usize;
    }
    assert_eq!(position, bytes.len());

    assert_eq!(
        &ids[..6],
        &[
            ChunkId::DeviceInfo,
            ChunkId::SoftwareInfo,
            ChunkId::Capabilities,
            ChunkId::MotionIntrinsics,
            ChunkId::StreamInfo,
            ChunkId::Properties,
        ]
    );
    // 6 frames of three chunks and 3 motion samples of two
    assert_eq!(ids.len(), 6 + 6 * 3 + 3 * 2);

    let reader = ContainerReader::open(&path).unwrap();
    let device = reader
        .chunks()
        .map(Result::unwrap)
        .find(|c| c.kind() == Some(ChunkId::DeviceInfo))
        .map(|c| pod_read_unaligned::<DeviceInfo>(c.data))
        .unwrap();
    assert_eq!(device.name(), "Depth Camera");
    assert_eq!(device.serial(), "0042");
}

#[test]
fn test_per_stream_compression() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("compression.rsl");
    let mut depth = stream_config(StreamKind::Depth, 30);
    depth.compression = Some(CompressionType::None);
    let config = RecorderConfig::new(&path, vec![depth, stream_config(StreamKind::Color, 30)]);

    let recorder = Recorder::new();
    recorder
        .configure(&config, &DeviceMetadata::default())
        .unwrap();
    recorder.start().unwrap();

    let depth_frame = frame(StreamKind::Depth, 30, 1);
    let color_frame = frame(StreamKind::Color, 30, 2);
    recorder.record_sample(depth_frame.clone());
    recorder.record_sample(color_frame.clone());
    wait_until_written(&recorder);
    recorder.stop().unwrap();

    let reader = ContainerReader::open(&path).unwrap();
    for info in reader.stream_infos().unwrap() {
        let expected = match StreamKind::from_u32(info.stream).unwrap() {
            StreamKind::Depth => CompressionType::None,
            _ => CompressionType::Lz4,
        };
        assert_eq!(info.compression, expected as u32);
    }

    let payload = |sample: &Sample| match &sample.payload {
        rslrec::sample::SamplePayload::Frame(frame) => frame.data.to_vec(),
        _ => unreachable!(),
    };

    let samples = reader.samples().unwrap();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].data, payload(&depth_frame).as_slice());
    assert_ne!(samples[1].data, payload(&color_frame).as_slice());
    assert_eq!(
        decompress(CompressionType::Lz4, samples[1].data).unwrap(),
        payload(&color_frame)
    );
}

#[test]
fn test_stop_discards_pending_samples() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stop.rsl");
    let config = RecorderConfig::new(&path, vec![stream_config(StreamKind::Depth, 30)]);

    let recorder = Recorder::new();
    recorder
        .configure(&config, &DeviceMetadata::default())
        .unwrap();
    for number in 0..3 {
        recorder.record_sample(frame(StreamKind::Depth, 30, number));
    }
    assert_eq!(recorder.stats().queued, 3);

    recorder.stop().unwrap();
    assert_eq!(recorder.stats().discarded, 3);
    assert_eq!(recorder.stats().queued, 0);

    // Input after stop is ignored.
    recorder.record_sample(frame(StreamKind::Depth, 30, 3));
    assert_eq!(recorder.stats().accepted, 3);

    let reader = ContainerReader::open(&path).unwrap();
    assert!(reader.samples().unwrap().is_empty());
    assert_eq!(reader.stream_infos().unwrap()[0].frame_count, 0);
}
