//! Per-record analysis pipeline: locate → normalize → estimate → map note.
//!
//! [`RecordingAnalyzer`] is the seam between the poller and the pipeline so
//! the poller's write-back discipline can be tested with a mock.  The
//! production implementation, [`PitchPipeline`], returns a typed
//! [`AnalysisError`] for every failure mode; the poller never needs to
//! catch anything unstructured — it pattern-matches the result and decides
//! the write-back.

use std::path::PathBuf;

use thiserror::Error;

use crate::audio::{load_wav, AudioError, AudioNormalizer};
use crate::pitch::{hz_to_note, PitchError, PitchEstimator};
use crate::store::{Analysis, Recording};

// ---------------------------------------------------------------------------
// AnalysisError
// ---------------------------------------------------------------------------

/// Every way a single record's analysis can fail.
///
/// All variants are isolated to their record: the `Display` text lands
/// verbatim in the record's `error_message` and the worker moves on to the
/// next record.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The record carries no `audio_filename`.  Written back as an error so
    /// the record never stays silently `pending` forever.
    #[error("recording {id} has no audio_filename")]
    MissingFilename { id: String },

    /// The referenced file is not on disk under the audio root.
    #[error("Audio file not found at {path}")]
    FileNotFound { path: String },

    /// Normalization or WAV decoding failed.
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Model inference failed, or no usable pitch survived filtering.
    #[error(transparent)]
    Pitch(#[from] PitchError),
}

// ---------------------------------------------------------------------------
// RecordingAnalyzer trait
// ---------------------------------------------------------------------------

/// Blocking, thread-safe analysis of one recording document.
///
/// Implementations must be `Send + Sync`; the poller calls them from a
/// blocking task, one record at a time.
pub trait RecordingAnalyzer: Send + Sync {
    fn analyze(&self, recording: &Recording) -> Result<Analysis, AnalysisError>;
}

// ---------------------------------------------------------------------------
// PitchPipeline
// ---------------------------------------------------------------------------

/// Production pipeline: ffmpeg normalization into a `wav_cache/` directory
/// under the audio root, then estimation and note mapping.
pub struct PitchPipeline {
    audio_dir: PathBuf,
    wav_cache: PathBuf,
    normalizer: AudioNormalizer,
    estimator: PitchEstimator,
}

impl PitchPipeline {
    pub fn new(
        audio_dir: PathBuf,
        normalizer: AudioNormalizer,
        estimator: PitchEstimator,
    ) -> Self {
        let wav_cache = audio_dir.join("wav_cache");
        Self {
            audio_dir,
            wav_cache,
            normalizer,
            estimator,
        }
    }
}

impl RecordingAnalyzer for PitchPipeline {
    fn analyze(&self, recording: &Recording) -> Result<Analysis, AnalysisError> {
        let filename =
            recording
                .audio_filename
                .as_deref()
                .ok_or_else(|| AnalysisError::MissingFilename {
                    id: recording.id.to_hex(),
                })?;

        let src_path = self.audio_dir.join(filename);
        if !src_path.exists() {
            return Err(AnalysisError::FileNotFound {
                path: src_path.display().to_string(),
            });
        }

        let wav_path = self.normalizer.normalize(&src_path, &self.wav_cache)?;
        let waveform = load_wav(&wav_path)?;

        let mono = waveform.to_mono();
        let estimate = self
            .estimator
            .estimate(&mono, waveform.sample_rate)?
            .ok_or(PitchError::NoStablePitch)?;

        Ok(Analysis {
            pitch_hz: estimate.pitch_hz as f64,
            pitch_note: hz_to_note(estimate.pitch_hz as f64),
            confidence: estimate.confidence as f64,
            method: self.estimator.profile().method.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
