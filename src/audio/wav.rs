//! WAV loading into an in-memory waveform.
//!
//! Normalized clips come back from ffmpeg as 16-bit PCM WAV, but the loader
//! accepts any integer bit depth (scaled to [-1, 1]) as well as 32-bit
//! float, so locally produced fixtures work too.

use std::path::Path;

use super::normalize::AudioError;

// ---------------------------------------------------------------------------
// Waveform
// ---------------------------------------------------------------------------

/// Decoded audio: interleaved `f32` samples plus layout metadata.
#[derive(Debug, Clone)]
pub struct Waveform {
    /// Interleaved samples in [-1, 1]; length is a multiple of `channels`.
    pub samples: Vec<f32>,
    /// Number of interleaved channels (1 after normalization).
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl Waveform {
    /// Mix down to a single channel by averaging all channels per frame.
    ///
    /// Already-mono input is returned as an owned copy without averaging.
    pub fn to_mono(&self) -> Vec<f32> {
        match self.channels {
            0 => Vec::new(),
            1 => self.samples.clone(),
            n => {
                let n = n as usize;
                self.samples
                    .chunks_exact(n)
                    .map(|frame| frame.iter().sum::<f32>() / n as f32)
                    .collect()
            }
        }
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.channels == 0 || self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.channels as f32 / self.sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// load_wav
// ---------------------------------------------------------------------------

/// Load a WAV file from disk into a [`Waveform`].
///
/// Integer PCM of any bit depth up to 32 is scaled by `2^(bits-1)`;
/// 32-bit float passes through untouched.
///
/// # Errors
///
/// - [`AudioError::WavRead`]           — file missing or not a valid WAV.
/// - [`AudioError::UnsupportedFormat`] — e.g. 64-bit float.
pub fn load_wav(path: &Path) -> Result<Waveform, AudioError> {
    let wav_read = |source| AudioError::WavRead {
        path: path.display().to_string(),
        source,
    };

    let mut reader = hound::WavReader::open(path).map_err(wav_read)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(wav_read)?,
        (hound::SampleFormat::Int, bits) if bits <= 32 => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(wav_read)?
        }
        (format, bits) => {
            return Err(AudioError::UnsupportedFormat(format!(
                "{format:?} at {bits} bits"
            )));
        }
    };

    Ok(Waveform {
        samples,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
