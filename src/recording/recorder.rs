//! Recording pipeline: admission, queue and the background writer thread

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::{DeviceMetadata, RecorderConfig};
use crate::sample::{Sample, StreamKind};
use crate::storage::ContainerWriter;
use crate::{RecorderError, Result};

use super::AdmissionControl;

/// Counters describing what happened to submitted samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    /// Samples that passed admission control
    pub accepted: u64,
    /// Samples rejected by admission control
    pub dropped: u64,
    /// Queued samples thrown away by pause or stop
    pub discarded: u64,
    /// Samples serialized without error
    pub written: u64,
    /// Samples whose serialization failed
    pub write_errors: u64,
    /// Samples currently waiting in the queue
    pub queued: usize,
}

enum Lifecycle {
    Unconfigured,
    Configured(ContainerWriter),
    Recording(JoinHandle<BTreeMap<StreamKind, u32>>),
    Stopped(BTreeMap<StreamKind, u32>),
}

/// Everything guarded by the queue lock
struct QueueState {
    samples: VecDeque<Sample>,
    paused: bool,
    stopping: bool,
    admission: Option<AdmissionControl>,
}

impl QueueState {
    /// Empty the queue, returning the admission slots its frames held
    fn discard_all(&mut self) -> usize {
        let discarded = self.samples.len();
        for sample in self.samples.drain(..) {
            if let (Some(stream), Some(admission)) = (sample.stream(), self.admission.as_mut()) {
                admission.release(stream);
            }
        }
        discarded
    }
}

struct Shared {
    queue: Mutex<QueueState>,
    /// Wake notification, never held together with `queue`
    signal: Mutex<bool>,
    wake: Condvar,
    accepted: AtomicU64,
    dropped: AtomicU64,
    discarded: AtomicU64,
    written: AtomicU64,
    write_errors: AtomicU64,
}

impl Shared {
    fn notify(&self) {
        let mut pending = self.signal.lock();
        *pending = true;
        self.wake.notify_one();
    }

    fn wait_for_signal(&self) {
        let mut pending = self.signal.lock();
        while !*pending {
            self.wake.wait(&mut pending);
        }
        *pending = false;
    }

    fn is_stopping(&self) -> bool {
        self.queue.lock().stopping
    }

    /// Write queued samples until the queue is empty. The queue lock is
    /// released while each sample is serialized.
    fn drain(&self, writer: &mut ContainerWriter) {
        loop {
            let Some(mut sample) = self.queue.lock().samples.pop_front() else {
                break;
            };

            let stream = sample.stream();
            match writer.write_sample(&mut sample) {
                Ok(()) => {
                    self.written.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.write_errors.fetch_add(1, Ordering::Relaxed);
                    error!(
                        "Failed to write {:?} sample captured at {}: {}",
                        sample.kind(),
                        sample.capture_time,
                        e
                    );
                }
            }

            if let Some(stream) = stream {
                if let Some(admission) = self.queue.lock().admission.as_mut() {
                    admission.release(stream);
                }
            }
        }
    }
}

fn write_loop(shared: Arc<Shared>, mut writer: ContainerWriter) -> BTreeMap<StreamKind, u32> {
    debug!("Writer thread started");

    loop {
        shared.drain(&mut writer);
        if shared.is_stopping() {
            break;
        }
        shared.wait_for_signal();
    }

    if let Err(e) = writer.finalize() {
        shared.write_errors.fetch_add(1, Ordering::Relaxed);
        error!("Failed to patch frame counts: {}", e);
    }
    if let Err(e) = writer.close() {
        shared.write_errors.fetch_add(1, Ordering::Relaxed);
        error!("Failed to close {}: {}", writer.path().display(), e);
    }

    debug!("Writer thread finished");
    writer.frame_counts().clone()
}

/// Real-time sample recorder
///
/// Producers call [`Recorder::record_sample`] from any thread; a single
/// background thread serializes accepted samples in arrival order. Under
/// back-pressure frames are dropped rather than blocking the producer.
///
/// # Examples
///
/// ```no_run
/// use rslrec::config::{DeviceMetadata, RecorderConfig, StreamConfig};
/// use rslrec::recording::Recorder;
/// use rslrec::sample::{PixelFormat, StreamKind};
///
/// let config = RecorderConfig::new(
///     "capture.rsl",
///     vec![StreamConfig {
///         stream: StreamKind::Depth,
///         format: PixelFormat::Z16,
///         width: 640,
///         height: 480,
///         framerate: 30,
///         compression: None,
///     }],
/// );
///
/// let recorder = Recorder::new();
/// recorder.configure(&config, &DeviceMetadata::default())?;
/// recorder.start()?;
/// // ... recorder.record_sample(sample) from the device callback ...
/// recorder.stop()?;
/// # Ok::<(), rslrec::RecorderError>(())
/// ```
pub struct Recorder {
    shared: Arc<Shared>,
    state: Mutex<Lifecycle>,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    /// Create an unconfigured recorder
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(QueueState {
                    samples: VecDeque::new(),
                    paused: false,
                    stopping: false,
                    admission: None,
                }),
                signal: Mutex::new(false),
                wake: Condvar::new(),
                accepted: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                discarded: AtomicU64::new(0),
                written: AtomicU64::new(0),
                write_errors: AtomicU64::new(0),
            }),
            state: Mutex::new(Lifecycle::Unconfigured),
        }
    }

    /// Create the container file and write all configuration-time metadata
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::AlreadyConfigured`] on a second call,
    /// [`RecorderError::InvalidFrameRate`] if no stream or a zero frame rate
    /// is configured, or an I/O error if the file cannot be created or
    /// written. Nothing is touched on disk unless the frame rates are valid.
    pub fn configure(&self, config: &RecorderConfig, device: &DeviceMetadata) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            Lifecycle::Unconfigured => {}
            Lifecycle::Stopped(_) => {
                return Err(RecorderError::InvalidState(
                    "recorder is stopped".to_string(),
                ))
            }
            _ => return Err(RecorderError::AlreadyConfigured),
        }

        config.validate()?;
        let admission =
            AdmissionControl::new(config.streams.iter().map(|s| (s.stream, s.framerate)))?;

        let mut writer = ContainerWriter::create(&config.output, config.encoder())?;
        writer.write_header(config.streams.len() as u32, config.coordinate_system)?;
        writer.write_device_info(&device.info)?;
        writer.write_software_info()?;
        writer.write_capabilities(&device.capabilities)?;
        writer.write_motion_intrinsics(&device.motion_intrinsics)?;
        writer.write_stream_info(&config.streams, config.compression.level)?;
        writer.write_properties(&device.properties)?;
        writer.write_first_frame_offset()?;

        info!(
            "Configured recording to {} ({} streams, reference rate {} fps)",
            config.output.display(),
            config.streams.len(),
            admission.reference_rate()
        );

        self.shared.queue.lock().admission = Some(admission);
        *state = Lifecycle::Configured(writer);
        Ok(())
    }

    /// Spawn the background writer thread
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::NotConfigured`] before configuration,
    /// [`RecorderError::InvalidState`] if already started or stopped, or an
    /// I/O error if the thread cannot be spawned
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        let writer = match std::mem::replace(&mut *state, Lifecycle::Unconfigured) {
            Lifecycle::Configured(writer) => writer,
            other => {
                let err = match &other {
                    Lifecycle::Unconfigured => RecorderError::NotConfigured,
                    Lifecycle::Recording(_) => {
                        RecorderError::InvalidState("recorder already started".to_string())
                    }
                    _ => RecorderError::InvalidState("recorder is stopped".to_string()),
                };
                *state = other;
                return Err(err);
            }
        };

        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name("rslrec-writer".to_string())
            .spawn(move || write_loop(shared, writer))
        {
            Ok(handle) => {
                *state = Lifecycle::Recording(handle);
                info!("Recording started");
                Ok(())
            }
            Err(e) => {
                *state = Lifecycle::Stopped(BTreeMap::new());
                Err(e.into())
            }
        }
    }

    /// Submit a sample from the producer side
    ///
    /// Never blocks on I/O and never fails: while paused, stopped or over a
    /// stream's admission ceiling the sample is dropped.
    pub fn record_sample(&self, sample: Sample) {
        let kind = sample.kind();
        let capture_time = sample.capture_time;

        let accepted = {
            let mut queue = self.shared.queue.lock();
            if queue.paused || queue.stopping {
                return;
            }

            let admitted = queue
                .admission
                .as_mut()
                .is_some_and(|admission| admission.admit(&sample));
            if admitted {
                queue.samples.push_back(sample);
            }
            admitted
        };

        if accepted {
            self.shared.accepted.fetch_add(1, Ordering::Relaxed);
            self.shared.notify();
        } else {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Sample dropped, type {:?}, capture time {}",
                kind, capture_time
            );
        }
    }

    /// Pause or resume recording, discarding everything currently queued
    pub fn set_pause(&self, pause: bool) {
        let discarded = {
            let mut queue = self.shared.queue.lock();
            let discarded = queue.discard_all();
            queue.paused = pause;
            discarded
        };

        self.shared
            .discarded
            .fetch_add(discarded as u64, Ordering::Relaxed);
        info!(
            "Recording {}, {} queued samples discarded",
            if pause { "paused" } else { "resumed" },
            discarded
        );
    }

    /// Whether input is currently being dropped
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.shared.queue.lock().paused
    }

    /// Stop recording: discard the queue, finalize and close the file, and
    /// join the writer thread. Safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns error if finalizing an unstarted recording fails or the
    /// writer thread panicked
    pub fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();

        let discarded = {
            let mut queue = self.shared.queue.lock();
            queue.stopping = true;
            queue.discard_all()
        };
        if discarded > 0 {
            self.shared
                .discarded
                .fetch_add(discarded as u64, Ordering::Relaxed);
            debug!("Discarded {} queued samples on stop", discarded);
        }

        let frame_counts = match std::mem::replace(&mut *state, Lifecycle::Stopped(BTreeMap::new()))
        {
            Lifecycle::Recording(handle) => {
                self.shared.notify();
                handle.join().map_err(|_| {
                    RecorderError::InvalidState("writer thread panicked".to_string())
                })?
            }
            Lifecycle::Configured(mut writer) => {
                writer.finalize()?;
                writer.close()?;
                writer.frame_counts().clone()
            }
            Lifecycle::Stopped(frame_counts) => frame_counts,
            Lifecycle::Unconfigured => BTreeMap::new(),
        };

        if !frame_counts.is_empty() {
            info!("Recording stopped: {:?}", frame_counts);
        }
        *state = Lifecycle::Stopped(frame_counts);
        Ok(())
    }

    /// Final per-stream frame counts, once stopped
    #[must_use]
    pub fn frame_counts(&self) -> Option<BTreeMap<StreamKind, u32>> {
        match &*self.state.lock() {
            Lifecycle::Stopped(frame_counts) => Some(frame_counts.clone()),
            _ => None,
        }
    }

    /// Frames of `stream` currently queued or being written
    #[must_use]
    pub fn in_flight(&self, stream: StreamKind) -> u32 {
        self.shared
            .queue
            .lock()
            .admission
            .as_ref()
            .map_or(0, |admission| admission.in_flight(stream))
    }

    /// Snapshot of the pipeline counters
    #[must_use]
    pub fn stats(&self) -> RecorderStats {
        RecorderStats {
            accepted: self.shared.accepted.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            discarded: self.shared.discarded.load(Ordering::Relaxed),
            written: self.shared.written.load(Ordering::Relaxed),
            write_errors: self.shared.write_errors.load(Ordering::Relaxed),
            queued: self.shared.queue.lock().samples.len(),
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Failed to stop recorder: {}", e);
        }
    }
}
