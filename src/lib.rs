//! rslrec - real-time multi-sensor sample recorder
//!
//! Samples flow from producers through a rate-aware, lossy queue into a
//! single background writer that serializes them into a chunked container
//! file, compressing frame payloads per stream.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::multiple_crate_versions
)]

pub mod compression;
pub mod config;
pub mod error;
pub mod recording;
pub mod sample;
pub mod storage;

pub use error::{RecorderError, Result};
