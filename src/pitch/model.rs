//! Pitch model boundary: per-frame pitch/periodicity prediction.
//!
//! # Overview
//!
//! [`PitchModel`] is the interface the estimator talks to.  It is
//! object-safe and `Send + Sync` so it can be held behind an
//! `Arc<dyn PitchModel>`.
//!
//! [`CrepeModel`] is the production implementation: an ONNX export of the
//! CREPE pitch tracker run through `ort`.  Construct it with
//! [`CrepeModel::load`].
//!
//! [`MockPitchModel`] (available under `#[cfg(test)]`) returns a
//! pre-configured frame sequence — useful for unit-testing the estimator
//! and poller without a model file.

use std::path::Path;
use std::sync::Mutex;

use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use thiserror::Error;

// ---------------------------------------------------------------------------
// PitchError
// ---------------------------------------------------------------------------

/// All errors that can arise from the pitch-estimation subsystem.
#[derive(Debug, Clone, Error)]
pub enum PitchError {
    /// The ONNX model file was not found at the given path.
    #[error("pitch model not found: {0}")]
    ModelNotFound(String),

    /// `ort` failed to build a session from the model file.
    #[error("pitch model initialisation failed: {0}")]
    ModelInit(String),

    /// An error occurred during the inference pass.
    #[error("pitch inference failed: {0}")]
    Inference(String),

    /// The waveform is not at the sample rate the model was trained on.
    #[error("pitch model expects {expected} Hz audio, got {got} Hz")]
    UnsupportedSampleRate { expected: u32, got: u32 },

    /// The requested frequency search band contains no model bins.
    #[error("invalid frequency search band {fmin}..{fmax} Hz")]
    InvalidBand { fmin: f32, fmax: f32 },

    /// Every frame fell below the confidence floor — no usable pitch.
    #[error("could not estimate a stable pitch")]
    NoStablePitch,
}

// ---------------------------------------------------------------------------
// PitchFrames
// ---------------------------------------------------------------------------

/// Per-frame model output: one pitch and one periodicity score per frame.
///
/// Periodicity is the model's confidence that the frame is voiced, in
/// [0, 1].  Both vectors always have the same length.
#[derive(Debug, Clone, Default)]
pub struct PitchFrames {
    /// Estimated fundamental frequency per frame, in Hz.
    pub pitch_hz: Vec<f32>,
    /// Voicing confidence per frame, in [0, 1].
    pub periodicity: Vec<f32>,
}

// ---------------------------------------------------------------------------
// PitchModel trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe interface for neural pitch trackers.
///
/// # Contract
///
/// - `mono` must be single-channel `f32` PCM at [`CREPE_SAMPLE_RATE`].
/// - `hop_length` is the frame stride in samples and must be ≥ 1.
/// - The search is restricted to `[fmin, fmax]` Hz; frequencies outside the
///   band never appear in the output.
/// - Returns [`PitchFrames`] with `1 + mono.len() / hop_length` frames.
pub trait PitchModel: Send + Sync {
    fn predict(
        &self,
        mono: &[f32],
        sample_rate: u32,
        hop_length: usize,
        fmin: f32,
        fmax: f32,
    ) -> Result<PitchFrames, PitchError>;
}

// Compile-time assertion: Box<dyn PitchModel> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn PitchModel>) {}
};

// ---------------------------------------------------------------------------
// CREPE constants
// ---------------------------------------------------------------------------

/// Sample rate the CREPE network was trained on, in Hz.
pub const CREPE_SAMPLE_RATE: u32 = 16_000;

/// Analysis window the network consumes, in samples (64 ms at 16 kHz).
const WINDOW_SIZE: usize = 1024;

/// Number of pitch bins in the activation output.
const PITCH_BINS: usize = 360;

/// Bin spacing in cents.
const CENTS_PER_BIN: f32 = 20.0;

/// Cents value of bin 0, relative to a 10 Hz reference.
const CENTS_OFFSET: f32 = 1_997.379_4;

/// Half-width of the local weighted average taken around the peak bin.
const DECODE_RADIUS: usize = 4;

// ---------------------------------------------------------------------------
// Bin/frequency conversions
// ---------------------------------------------------------------------------

/// Cents above the 10 Hz reference for a given frequency.
fn hz_to_cents(hz: f32) -> f32 {
    1_200.0 * (hz / 10.0).log2()
}

/// Frequency for a given cents value above the 10 Hz reference.
fn cents_to_hz(cents: f32) -> f32 {
    10.0 * (cents / 1_200.0).exp2()
}

/// Cents value at the center of bin `bin`.
fn bin_to_cents(bin: usize) -> f32 {
    CENTS_OFFSET + CENTS_PER_BIN * bin as f32
}

/// The inclusive bin range covering `[fmin, fmax]`, or `None` when the band
/// misses every bin.
fn band_to_bins(fmin: f32, fmax: f32) -> Option<(usize, usize)> {
    let lo = ((hz_to_cents(fmin) - CENTS_OFFSET) / CENTS_PER_BIN).ceil();
    let hi = ((hz_to_cents(fmax) - CENTS_OFFSET) / CENTS_PER_BIN).floor();

    let lo = lo.max(0.0) as usize;
    let hi = hi.min((PITCH_BINS - 1) as f32);
    if hi < 0.0 || lo > hi as usize {
        return None;
    }
    Some((lo, hi as usize))
}

/// Decode one activation row into (pitch Hz, periodicity).
///
/// The peak bin inside `[lo, hi]` gives the periodicity; the pitch is the
/// activation-weighted average of cents over a ±[`DECODE_RADIUS`]-bin
/// neighbourhood of the peak, which recovers sub-bin precision the way the
/// reference CREPE decoder does.
fn decode_activation(row: &[f32], lo: usize, hi: usize) -> (f32, f32) {
    let mut best = lo;
    for bin in lo..=hi {
        if row[bin] > row[best] {
            best = bin;
        }
    }
    let periodicity = row[best].clamp(0.0, 1.0);

    let start = best.saturating_sub(DECODE_RADIUS).max(lo);
    let end = (best + DECODE_RADIUS).min(hi);

    let mut weight_sum = 0.0f32;
    let mut cents_sum = 0.0f32;
    for bin in start..=end {
        let w = row[bin].max(0.0);
        weight_sum += w;
        cents_sum += w * bin_to_cents(bin);
    }

    let cents = if weight_sum > 0.0 {
        cents_sum / weight_sum
    } else {
        bin_to_cents(best)
    };

    (cents_to_hz(cents), periodicity)
}

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// Cut `mono` into centered, zero-padded, per-frame-normalized windows and
/// return them as one flat `[n_frames × WINDOW_SIZE]` buffer.
fn extract_frames(mono: &[f32], hop_length: usize) -> (usize, Vec<f32>) {
    let n_frames = 1 + mono.len() / hop_length;
    let mut flat = Vec::with_capacity(n_frames * WINDOW_SIZE);

    for i in 0..n_frames {
        let center = (i * hop_length) as isize;
        let start = center - (WINDOW_SIZE / 2) as isize;

        let frame_begin = flat.len();
        for j in 0..WINDOW_SIZE {
            let idx = start + j as isize;
            let sample = if idx >= 0 && (idx as usize) < mono.len() {
                mono[idx as usize]
            } else {
                0.0
            };
            flat.push(sample);
        }

        // Per-frame mean/std normalization, as the network expects.
        let frame = &mut flat[frame_begin..];
        let mean = frame.iter().sum::<f32>() / WINDOW_SIZE as f32;
        let var = frame
            .iter()
            .map(|s| (s - mean) * (s - mean))
            .sum::<f32>()
            / WINDOW_SIZE as f32;
        let std = var.sqrt().max(1e-10);
        for s in frame.iter_mut() {
            *s = (*s - mean) / std;
        }
    }

    (n_frames, flat)
}

// ---------------------------------------------------------------------------
// CrepeModel
// ---------------------------------------------------------------------------

/// Production pitch tracker: a CREPE ONNX export run through `ort`.
///
/// The session is guarded by a `Mutex` because `ort` sessions take `&mut`
/// for `run`; one poller processes one record at a time, so the lock is
/// never contended in practice.
pub struct CrepeModel {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl std::fmt::Debug for CrepeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrepeModel")
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .finish_non_exhaustive()
    }
}

impl CrepeModel {
    /// Load a CREPE ONNX export from `model_path` and prepare it for
    /// inference.
    ///
    /// # Errors
    ///
    /// - [`PitchError::ModelNotFound`] — `model_path` does not exist.
    /// - [`PitchError::ModelInit`]     — `ort` failed to load the file.
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self, PitchError> {
        let path = model_path.as_ref();

        if !path.exists() {
            return Err(PitchError::ModelNotFound(path.display().to_string()));
        }

        let session = Session::builder()
            .and_then(|b| Ok(b.with_optimization_level(GraphOptimizationLevel::Level3)?))
            .and_then(|b| Ok(b.with_intra_threads(inference_threads())?))
            .and_then(|mut b| Ok(b.commit_from_file(path)?))
            .map_err(|e| PitchError::ModelInit(e.to_string()))?;

        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .ok_or_else(|| PitchError::ModelInit("model declares no inputs".into()))?;
        let output_name = session
            .outputs()
            .first()
            .map(|o| o.name().to_string())
            .ok_or_else(|| PitchError::ModelInit("model declares no outputs".into()))?;

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

impl PitchModel for CrepeModel {
    fn predict(
        &self,
        mono: &[f32],
        sample_rate: u32,
        hop_length: usize,
        fmin: f32,
        fmax: f32,
    ) -> Result<PitchFrames, PitchError> {
        if sample_rate != CREPE_SAMPLE_RATE {
            return Err(PitchError::UnsupportedSampleRate {
                expected: CREPE_SAMPLE_RATE,
                got: sample_rate,
            });
        }
        if hop_length == 0 {
            return Err(PitchError::Inference("hop_length must be ≥ 1".into()));
        }
        let (lo, hi) =
            band_to_bins(fmin, fmax).ok_or(PitchError::InvalidBand { fmin, fmax })?;

        let (n_frames, flat) = extract_frames(mono, hop_length);

        let input = Tensor::from_array(([n_frames as i64, WINDOW_SIZE as i64], flat))
            .map_err(|e| PitchError::Inference(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| PitchError::Inference("model session lock poisoned".into()))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| PitchError::Inference(e.to_string()))?;

        let activation = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            PitchError::Inference(format!("model output `{}` missing", self.output_name))
        })?;
        let (_, data) = activation
            .try_extract_tensor::<f32>()
            .map_err(|e| PitchError::Inference(e.to_string()))?;

        if data.len() != n_frames * PITCH_BINS {
            return Err(PitchError::Inference(format!(
                "unexpected activation size {} for {n_frames} frames",
                data.len()
            )));
        }

        let mut frames = PitchFrames {
            pitch_hz: Vec::with_capacity(n_frames),
            periodicity: Vec::with_capacity(n_frames),
        };
        for row in data.chunks_exact(PITCH_BINS) {
            let (hz, periodicity) = decode_activation(row, lo, hi);
            frames.pitch_hz.push(hz);
            frames.periodicity.push(periodicity);
        }

        Ok(frames)
    }
}

/// Number of CPU threads handed to the ONNX session, capped at 4 — the
/// CREPE graph is small and gains little beyond that.
fn inference_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(4))
        .unwrap_or(2)
}

// ---------------------------------------------------------------------------
// MockPitchModel  (test-only)
// ---------------------------------------------------------------------------

/// A test double that returns a pre-configured frame sequence without any
/// model file, ignoring the waveform contents.
#[cfg(test)]
pub struct MockPitchModel {
    frames: PitchFrames,
}

#[cfg(test)]
impl MockPitchModel {
    /// Create a mock that always returns the given pitch/periodicity frames.
    pub fn with_frames(pitch_hz: Vec<f32>, periodicity: Vec<f32>) -> Self {
        assert_eq!(pitch_hz.len(), periodicity.len());
        Self {
            frames: PitchFrames {
                pitch_hz,
                periodicity,
            },
        }
    }
}

#[cfg(test)]
impl PitchModel for MockPitchModel {
    fn predict(
        &self,
        _mono: &[f32],
        sample_rate: u32,
        hop_length: usize,
        _fmin: f32,
        _fmax: f32,
    ) -> Result<PitchFrames, PitchError> {
        // Enforce the contract even in the mock so callers are tested
        // against it.
        if sample_rate != CREPE_SAMPLE_RATE {
            return Err(PitchError::UnsupportedSampleRate {
                expected: CREPE_SAMPLE_RATE,
                got: sample_rate,
            });
        }
        assert!(hop_length >= 1);
        Ok(self.frames.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
