//! rslrec CLI

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rslrec::config::RecorderConfig;
use rslrec::recording::Recorder;
use rslrec::sample::{Frame, PixelFormat, Sample, SampleKind, StreamKind};
use rslrec::storage::{ContainerReader, CoordinateSystem, MotionData, TimestampData};

/// Record and inspect multi-sensor container files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize a container file
    Inspect {
        /// Container file
        file: PathBuf,
    },
    /// Record synthetic samples through the full pipeline
    Synth {
        /// TOML recorder configuration
        config: PathBuf,
        /// Frames to generate per stream
        #[arg(short, long, default_value_t = 90)]
        frames: u64,
        /// Pace generation at the slowest stream's frame rate
        #[arg(long)]
        realtime: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Args::parse().command {
        Command::Inspect { file } => inspect(&file),
        Command::Synth {
            config,
            frames,
            realtime,
        } => synth(&config, frames, realtime),
    }
}

fn inspect(path: &Path) -> Result<()> {
    let reader = ContainerReader::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let header = reader.header();

    println!("File: {}", path.display());
    println!(
        "Version: {} ({})",
        header.version,
        String::from_utf8_lossy(&header.id)
    );
    println!(
        "Coordinate system: {:?}",
        CoordinateSystem::from_u32(header.coordinate_system)
    );
    println!("First frame offset: {}", header.first_frame_offset);
    println!();

    let mut chunk_counts: BTreeMap<String, usize> = BTreeMap::new();
    for chunk in reader.chunks() {
        let chunk = chunk?;
        let name = chunk
            .kind()
            .map_or_else(|| format!("unknown({})", chunk.id), |k| format!("{k:?}"));
        *chunk_counts.entry(name).or_insert(0) += 1;
    }
    println!("Chunks:");
    for (name, count) in &chunk_counts {
        println!("  {name:<18} {count}");
    }
    println!();

    println!("Streams:");
    for info in reader.stream_infos()? {
        println!(
            "  {:<10} {:?} {}x{} @ {} fps, compression {}, {} frames",
            format!("{:?}", StreamKind::from_u32(info.stream)),
            PixelFormat::from_u32(info.format),
            info.width,
            info.height,
            info.framerate,
            info.compression,
            info.frame_count
        );
    }
    println!();

    let mut sample_counts: BTreeMap<String, usize> = BTreeMap::new();
    for sample in reader.samples()? {
        let kind = format!("{:?}", SampleKind::from_u32(sample.info.sample_type));
        *sample_counts.entry(kind).or_insert(0) += 1;
    }
    println!("Samples:");
    for (kind, count) in &sample_counts {
        println!("  {kind:<18} {count}");
    }

    Ok(())
}

fn synth(config_path: &Path, frames: u64, realtime: bool) -> Result<()> {
    let config = RecorderConfig::from_file(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let recorder = Recorder::new();
    recorder.configure(&config, &config.device.metadata())?;
    recorder.start()?;

    let slowest = config
        .streams
        .iter()
        .map(|s| s.framerate)
        .min()
        .unwrap_or(30);
    let period = Duration::from_secs(1) / slowest;

    for number in 0..frames {
        let capture_time = number * period.as_micros() as u64;

        for stream in &config.streams {
            let stride = stream.format.min_stride(stream.width);
            let pattern = (number as u8).wrapping_add(stream.stream as u8);
            let frame = Frame {
                stream: stream.stream,
                format: stream.format,
                width: stream.width,
                height: stream.height,
                stride,
                framerate: stream.framerate,
                number,
                system_time: capture_time,
                time_stamp: capture_time as f64 / 1000.0,
                data: Bytes::from(vec![pattern; stride as usize * stream.height as usize]),
            };
            recorder.record_sample(Sample::frame(capture_time, frame));
        }

        recorder.record_sample(Sample::motion(
            capture_time,
            MotionData {
                frame_number: number as u32,
                timestamp: capture_time as f64 / 1000.0,
                axes: [0.0, -9.81, 0.0],
                ..MotionData::default()
            },
        ));
        recorder.record_sample(Sample::timestamp(
            capture_time,
            TimestampData {
                frame_number: number as u32,
                timestamp: capture_time as f64 / 1000.0,
                ..TimestampData::default()
            },
        ));

        if realtime {
            thread::sleep(period);
        }
    }

    // stop() discards whatever is still queued, so let the writer catch up.
    loop {
        let stats = recorder.stats();
        if stats.queued == 0 && stats.written + stats.write_errors >= stats.accepted {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    recorder.stop()?;

    let stats = recorder.stats();
    info!(
        "Accepted {}, dropped {}, written {}, write errors {}",
        stats.accepted, stats.dropped, stats.written, stats.write_errors
    );
    if let Some(counts) = recorder.frame_counts() {
        for (stream, count) in counts {
            println!("{stream:?}: {count} frames");
        }
    }

    Ok(())
}
