//! Recording pipeline between sample producers and the container writer

mod admission;
mod recorder;

pub use admission::{reference_frame_rate, AdmissionControl};
pub use recorder::{Recorder, RecorderStats};

/// Frames a stream running at the reference rate may have in flight
pub const MAX_CACHED_SAMPLES: u32 = 5;
