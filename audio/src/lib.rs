//! Audio primitives for the roll-call pipeline.
//!
//! This crate provides:
//!
//! - [`Clip`]: an in-memory PCM clip (f32 samples, any rate/channel count)
//!   with mono downmix
//! - [`vad`]: RMS-based voice activity check, the fast reject before
//!   embedding extraction
//! - [`wav`]: WAV file read/write
//! - [`AudioSource`]: the capture interface the session engine records
//!   through, with a file-replay implementation for offline use

mod capture;
mod clip;
pub mod vad;
pub mod wav;

use thiserror::Error;

/// Errors returned by audio operations.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio: io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audio: wav error: {0}")]
    Wav(String),

    #[error("audio: capture source exhausted")]
    Exhausted,
}

pub use capture::{AudioSource, FileSequenceSource};
pub use clip::Clip;
