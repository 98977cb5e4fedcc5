//! Audio handling: normalization to canonical mono 16 kHz WAV and loading
//! into an in-memory waveform.
//!
//! [`AudioNormalizer`] shells out to ffmpeg; [`load_wav`] decodes the result
//! (or any WAV fixture) into a [`Waveform`] for the pitch estimator.

pub mod normalize;
pub mod wav;

pub use normalize::{AudioError, AudioNormalizer, TARGET_SAMPLE_RATE};
pub use wav::{load_wav, Waveform};
