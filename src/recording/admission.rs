//! Rate-aware admission control for queued frames

use std::collections::HashMap;

use crate::sample::{Sample, StreamKind};
use crate::{RecorderError, Result};

use super::MAX_CACHED_SAMPLES;

/// Minimum frame rate across all streams
///
/// # Errors
///
/// Returns [`RecorderError::InvalidFrameRate`] if `rates` is empty or any
/// rate is zero
pub fn reference_frame_rate(rates: impl IntoIterator<Item = (StreamKind, u32)>) -> Result<u32> {
    let mut reference: Option<u32> = None;

    for (stream, rate) in rates {
        if rate == 0 {
            return Err(RecorderError::InvalidFrameRate(format!(
                "stream {stream:?} has a frame rate of 0"
            )));
        }
        reference = Some(reference.map_or(rate, |min| min.min(rate)));
    }

    reference.ok_or_else(|| {
        RecorderError::InvalidFrameRate("no streams were configured".to_string())
    })
}

/// Per-stream bound on frames queued or being written
///
/// A stream's ceiling is `MAX_CACHED_SAMPLES * rate / reference_rate`, so
/// faster streams get proportionally more room than the slowest one. The
/// bound is advisory: callers check and release in separate critical
/// sections.
#[derive(Debug)]
pub struct AdmissionControl {
    rates: HashMap<StreamKind, u32>,
    reference_rate: u32,
    in_flight: HashMap<StreamKind, u32>,
}

impl AdmissionControl {
    /// Create admission control for the given stream rates
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::InvalidFrameRate`] if no stream is given or
    /// any rate is zero
    pub fn new(rates: impl IntoIterator<Item = (StreamKind, u32)>) -> Result<Self> {
        let rates: HashMap<StreamKind, u32> = rates.into_iter().collect();
        let reference_rate = reference_frame_rate(rates.iter().map(|(s, r)| (*s, *r)))?;

        Ok(Self {
            rates,
            reference_rate,
            in_flight: HashMap::new(),
        })
    }

    /// Slowest configured frame rate
    #[must_use]
    pub fn reference_rate(&self) -> u32 {
        self.reference_rate
    }

    /// Admission ceiling of a stream, `None` if it is not configured
    #[must_use]
    pub fn ceiling(&self, stream: StreamKind) -> Option<u32> {
        self.rates
            .get(&stream)
            .map(|rate| MAX_CACHED_SAMPLES.saturating_mul(*rate) / self.reference_rate)
    }

    /// Frames of `stream` currently queued or being written
    #[must_use]
    pub fn in_flight(&self, stream: StreamKind) -> u32 {
        self.in_flight.get(&stream).copied().unwrap_or(0)
    }

    /// Decide whether a sample may be queued, counting it if it is a frame
    ///
    /// Motion and timestamp samples are always admitted. Frames of streams
    /// that were never configured are rejected.
    pub fn admit(&mut self, sample: &Sample) -> bool {
        let Some(stream) = sample.stream() else {
            return true;
        };

        let Some(ceiling) = self.ceiling(stream) else {
            return false;
        };

        let count = self.in_flight.entry(stream).or_insert(0);
        if *count > ceiling {
            return false;
        }
        *count += 1;
        true
    }

    /// Account for a frame that left the pipeline
    pub fn release(&mut self, stream: StreamKind) {
        if let Some(count) = self.in_flight.get_mut(&stream) {
            *count = count.saturating_sub(1);
        }
    }
}
