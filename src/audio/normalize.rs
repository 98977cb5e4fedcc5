//! Audio normalization via an external transcoder.
//!
//! The pitch model expects **16 kHz mono** audio, but the browser uploads
//! whatever container/codec the user's recorder produced (webm/opus, m4a,
//! ogg …).  [`AudioNormalizer`] shells out to `ffmpeg` to downmix and
//! resample into a canonical WAV file, named after the input's stem, inside
//! a caller-chosen output directory.
//!
//! The transcoder binary is a struct field so tests can substitute a stub
//! executable instead of requiring a real ffmpeg install.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

/// Canonical sample rate produced by normalization, in Hz.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

// ---------------------------------------------------------------------------
// AudioError
// ---------------------------------------------------------------------------

/// All errors that can arise from audio normalization and WAV loading.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The input audio file does not exist.
    #[error("input audio file does not exist: {0}")]
    InputMissing(String),

    /// The input path has no usable file stem to derive the output name from.
    #[error("input path has no file stem: {0}")]
    NoFileStem(String),

    /// The output directory could not be created.
    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The transcoder binary could not be spawned at all (not installed,
    /// not on PATH, not executable).
    #[error("failed to run transcoder `{tool}`: {source}")]
    ToolSpawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The transcoder ran but exited non-zero.  Carries the exit code and
    /// whatever it wrote to stderr so the failure lands verbatim in the
    /// record's `error_message`.
    #[error("audio conversion failed (exit {code}): {stderr}")]
    ConversionFailed { code: String, stderr: String },

    /// The WAV file could not be opened or decoded.
    #[error("failed to read WAV file {path}: {source}")]
    WavRead {
        path: String,
        #[source]
        source: hound::Error,
    },

    /// The WAV file uses a sample format this worker does not decode.
    #[error("unsupported WAV sample format: {0}")]
    UnsupportedFormat(String),
}

// ---------------------------------------------------------------------------
// AudioNormalizer
// ---------------------------------------------------------------------------

/// Converts arbitrary audio files into canonical mono 16 kHz WAV.
///
/// Invokes the transcoder with overwrite-without-prompt (`-y`) and
/// errors-only logging (`-loglevel error`), so stderr carries nothing but
/// genuine failure detail.
#[derive(Debug, Clone)]
pub struct AudioNormalizer {
    tool: PathBuf,
    sample_rate: u32,
}

impl Default for AudioNormalizer {
    fn default() -> Self {
        Self {
            tool: PathBuf::from("ffmpeg"),
            sample_rate: TARGET_SAMPLE_RATE,
        }
    }
}

impl AudioNormalizer {
    /// Build a normalizer that uses an explicit transcoder binary.
    ///
    /// Production code uses [`AudioNormalizer::default`] (plain `ffmpeg` on
    /// PATH); tests point this at a stub executable.
    pub fn with_tool(tool: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            ..Self::default()
        }
    }

    /// Convert `input_path` into `<output_dir>/<input stem>.wav`, mono, at
    /// the target sample rate, overwriting any existing output.
    ///
    /// Returns the derived output path.  The output file is whatever the
    /// transcoder produced — this method does not re-open it.
    ///
    /// # Errors
    ///
    /// - [`AudioError::InputMissing`]     — `input_path` does not exist.
    /// - [`AudioError::OutputDir`]        — `output_dir` could not be created.
    /// - [`AudioError::ToolSpawn`]        — the transcoder could not start.
    /// - [`AudioError::ConversionFailed`] — the transcoder exited non-zero.
    pub fn normalize(&self, input_path: &Path, output_dir: &Path) -> Result<PathBuf, AudioError> {
        if !input_path.exists() {
            return Err(AudioError::InputMissing(
                input_path.display().to_string(),
            ));
        }

        std::fs::create_dir_all(output_dir).map_err(|source| AudioError::OutputDir {
            path: output_dir.display().to_string(),
            source,
        })?;

        let stem = input_path
            .file_stem()
            .ok_or_else(|| AudioError::NoFileStem(input_path.display().to_string()))?;

        let mut wav_name = stem.to_os_string();
        wav_name.push(".wav");
        let wav_path = output_dir.join(wav_name);

        let output = Command::new(&self.tool)
            .arg("-y")
            .args(["-loglevel", "error"])
            .arg("-i")
            .arg(input_path)
            .args(["-ac", "1"])
            .arg("-ar")
            .arg(self.sample_rate.to_string())
            .arg(&wav_path)
            .output()
            .map_err(|source| AudioError::ToolSpawn {
                tool: self.tool.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(AudioError::ConversionFailed { code, stderr });
        }

        Ok(wav_path)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_input_errors_before_spawning() {
        let dir = tempdir().expect("temp dir");
        let normalizer = AudioNormalizer::default();

        let err = normalizer
            .normalize(&dir.path().join("nope.webm"), dir.path())
            .unwrap_err();

        assert!(matches!(err, AudioError::InputMissing(_)));
        assert!(err.to_string().contains("nope.webm"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool_surfaces_conversion_failed() {
        let dir = tempdir().expect("temp dir");
        let input = dir.path().join("clip.webm");
        std::fs::write(&input, b"not really audio").expect("write input");

        // `false` accepts any arguments and always exits 1.
        let normalizer = AudioNormalizer::with_tool("false");
        let err = normalizer.normalize(&input, dir.path()).unwrap_err();

        match err {
            AudioError::ConversionFailed { code, .. } => assert_eq!(code, "1"),
            other => panic!("expected ConversionFailed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn output_path_is_stem_dot_wav_in_output_dir() {
        let dir = tempdir().expect("temp dir");
        let input = dir.path().join("my-take.ogg");
        std::fs::write(&input, b"x").expect("write input");
        let out_dir = dir.path().join("wav_cache");

        // `true` exits 0 without producing output — enough to check naming.
        let normalizer = AudioNormalizer::with_tool("true");
        let wav = normalizer.normalize(&input, &out_dir).expect("normalize");

        assert_eq!(wav, out_dir.join("my-take.wav"));
        assert!(out_dir.is_dir(), "output dir should have been created");
    }

    #[cfg(unix)]
    #[test]
    fn unspawnable_tool_surfaces_tool_spawn() {
        let dir = tempdir().expect("temp dir");
        let input = dir.path().join("clip.webm");
        std::fs::write(&input, b"x").expect("write input");

        let normalizer = AudioNormalizer::with_tool("/nonexistent/transcoder");
        let err = normalizer.normalize(&input, dir.path()).unwrap_err();

        assert!(matches!(err, AudioError::ToolSpawn { .. }));
    }
}
