//! Audio module - the demo host around a shared-buffer session
//!
//! This module provides:
//! - Audio input capture into a lock-free queue
//! - The output stream whose callback drives the render-side processor
//! - A sine source for machines without a capture device

mod input;
mod output;
mod tone;

use thiserror::Error;

pub use input::AudioInput;
pub use output::{AudioOutput, InputSource};

/// Errors that can occur while opening audio devices
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No {0} device available")]
    NoDevice(&'static str),

    #[error("Failed to get device config: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),

    #[error("Failed to build stream: {0}")]
    Build(#[from] cpal::BuildStreamError),

    #[error("Failed to start stream: {0}")]
    Play(#[from] cpal::PlayStreamError),

    #[error("Unsupported sample format: {0:?}")]
    UnsupportedFormat(cpal::SampleFormat),

    #[error(transparent)]
    Session(#[from] offload_rs::Error),
}
