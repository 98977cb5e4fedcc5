//! Confidence-filtered reduction of per-frame model output to one pitch.
//!
//! The model produces a pitch and a periodicity score per 10 ms frame.
//! [`PitchEstimator`] smooths both sequences with a short median filter,
//! drops frames below the profile's confidence floor, and aggregates the
//! survivors into a single [`PitchEstimate`] — or nothing at all when every
//! frame is unvoiced, which callers must treat as a failed estimate rather
//! than a zero-confidence success.

use std::sync::Arc;

use super::model::{PitchError, PitchFrames, PitchModel};

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// How retained (voiced) frames are reduced to one (pitch, confidence) pair.
///
/// The two variants carry different confidence semantics, so exactly one is
/// in effect per run — selected by the profile, never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Arithmetic mean of retained pitches; confidence is the mean
    /// periodicity over **all** frames (voiced or not).
    MeanAllFrames,
    /// Median of retained pitches; confidence is the mean periodicity over
    /// the retained frames only, clamped to [0, 1].
    MedianVoicedFrames,
}

// ---------------------------------------------------------------------------
// EstimatorProfile
// ---------------------------------------------------------------------------

/// A named bundle of search band, confidence floor and aggregation policy.
///
/// Modelled as explicit configuration rather than divergent code paths:
/// [`EstimatorProfile::tiny`] reproduces the low-fidelity worker defaults,
/// [`EstimatorProfile::full`] is the stricter high-fidelity variant covering
/// the C1–C8 range.
#[derive(Debug, Clone)]
pub struct EstimatorProfile {
    /// Lower bound of the frequency search band, in Hz.
    pub fmin: f32,
    /// Upper bound of the frequency search band, in Hz.
    pub fmax: f32,
    /// Frames with periodicity below this are excluded as unvoiced.
    pub confidence_floor: f32,
    /// Centered median-filter window over pitch and periodicity (odd, ≥ 1).
    pub median_window: usize,
    /// Reduction policy for the retained frames.
    pub aggregation: Aggregation,
    /// Tag persisted in `analysis.method` identifying this variant.
    pub method: &'static str,
}

impl EstimatorProfile {
    /// Low-fidelity profile: 50–800 Hz band, 0.1 floor, mean aggregation.
    /// This is the default and matches the original worker settings.
    pub fn tiny() -> Self {
        Self {
            fmin: 50.0,
            fmax: 800.0,
            confidence_floor: 0.1,
            median_window: 3,
            aggregation: Aggregation::MeanAllFrames,
            method: "crepe-tiny",
        }
    }

    /// High-fidelity profile: C1–C8 band, 0.8 voiced floor, median
    /// aggregation over voiced frames.
    pub fn full() -> Self {
        Self {
            fmin: 32.70,
            fmax: 4_186.01,
            confidence_floor: 0.8,
            median_window: 3,
            aggregation: Aggregation::MedianVoicedFrames,
            method: "crepe-full",
        }
    }
}

impl Default for EstimatorProfile {
    fn default() -> Self {
        Self::tiny()
    }
}

// ---------------------------------------------------------------------------
// PitchEstimate
// ---------------------------------------------------------------------------

/// A single aggregated pitch with its confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    /// Fundamental frequency in Hz; always > 0.
    pub pitch_hz: f32,
    /// Aggregated voicing confidence in [0, 1].
    pub confidence: f32,
}

// ---------------------------------------------------------------------------
// median_filter
// ---------------------------------------------------------------------------

/// Centered median filter with reflect padding at the edges.
///
/// `window` must be odd; a window of 1 (or input shorter than 2) returns the
/// input unchanged.  A 3-frame window is enough to suppress single-frame
/// outliers without smearing note onsets.
pub(crate) fn median_filter(xs: &[f32], window: usize) -> Vec<f32> {
    assert!(window % 2 == 1, "median window must be odd");
    if window <= 1 || xs.len() < 2 {
        return xs.to_vec();
    }

    let half = window / 2;
    let n = xs.len() as isize;

    // Reflect an out-of-range index back into the sequence (abcd → b|abcd|c).
    let reflect = |i: isize| -> usize {
        let mut i = i;
        if i < 0 {
            i = -i;
        }
        if i >= n {
            i = 2 * (n - 1) - i;
        }
        i.clamp(0, n - 1) as usize
    };

    let mut out = Vec::with_capacity(xs.len());
    let mut buf = Vec::with_capacity(window);
    for center in 0..xs.len() as isize {
        buf.clear();
        for offset in -(half as isize)..=(half as isize) {
            buf.push(xs[reflect(center + offset)]);
        }
        buf.sort_by(|a, b| a.total_cmp(b));
        out.push(buf[half]);
    }
    out
}

fn median(xs: &mut [f32]) -> f32 {
    xs.sort_by(|a, b| a.total_cmp(b));
    let mid = xs.len() / 2;
    if xs.len() % 2 == 1 {
        xs[mid]
    } else {
        (xs[mid - 1] + xs[mid]) / 2.0
    }
}

// ---------------------------------------------------------------------------
// PitchEstimator
// ---------------------------------------------------------------------------

/// Runs the model over a waveform and reduces the per-frame output to a
/// single estimate according to the configured profile.
///
/// Pure over its inputs and the model — no side effects, no hidden state.
pub struct PitchEstimator {
    model: Arc<dyn PitchModel>,
    profile: EstimatorProfile,
}

impl PitchEstimator {
    pub fn new(model: Arc<dyn PitchModel>, profile: EstimatorProfile) -> Self {
        Self { model, profile }
    }

    /// The profile this estimator was built with.
    pub fn profile(&self) -> &EstimatorProfile {
        &self.profile
    }

    /// Estimate a single pitch from a waveform.
    ///
    /// Multi-channel input is averaged down to mono first; the frame hop is
    /// derived from the sample rate (10 ms of audio per frame).
    ///
    /// Returns `Ok(None)` when zero frames survive the confidence filter —
    /// an absent estimate, not a zero-confidence success.
    pub fn estimate(
        &self,
        mono: &[f32],
        sample_rate: u32,
    ) -> Result<Option<PitchEstimate>, PitchError> {
        let hop_length = (sample_rate / 100).max(1) as usize;

        let frames = self.model.predict(
            mono,
            sample_rate,
            hop_length,
            self.profile.fmin,
            self.profile.fmax,
        )?;

        Ok(self.aggregate(&frames))
    }

    fn aggregate(&self, frames: &PitchFrames) -> Option<PitchEstimate> {
        if frames.pitch_hz.is_empty() {
            return None;
        }

        let pitch = median_filter(&frames.pitch_hz, self.profile.median_window);
        let periodicity = median_filter(&frames.periodicity, self.profile.median_window);

        let mut voiced: Vec<f32> = Vec::new();
        let mut voiced_periodicity: Vec<f32> = Vec::new();
        for (&hz, &p) in pitch.iter().zip(&periodicity) {
            if p >= self.profile.confidence_floor {
                voiced.push(hz);
                voiced_periodicity.push(p);
            }
        }

        if voiced.is_empty() {
            return None;
        }

        let (pitch_hz, confidence) = match self.profile.aggregation {
            Aggregation::MeanAllFrames => {
                let pitch_hz = voiced.iter().sum::<f32>() / voiced.len() as f32;
                let confidence =
                    periodicity.iter().sum::<f32>() / periodicity.len() as f32;
                (pitch_hz, confidence)
            }
            Aggregation::MedianVoicedFrames => {
                let pitch_hz = median(&mut voiced);
                let confidence = (voiced_periodicity.iter().sum::<f32>()
                    / voiced_periodicity.len() as f32)
                    .clamp(0.0, 1.0);
                (pitch_hz, confidence)
            }
        };

        Some(PitchEstimate {
            pitch_hz,
            confidence,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
