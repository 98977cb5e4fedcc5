//! Worker configuration from the execution environment.
//!
//! Everything the worker needs comes from environment variables (a `.env`
//! file alongside the binary is honoured for development):
//!
//! | Variable                    | Required | Default                          |
//! |-----------------------------|----------|----------------------------------|
//! | `MONGO_URI`                 | yes      | —                                |
//! | `MONGO_DB_NAME`             | yes      | —                                |
//! | `AUDIO_DIR`                 | no       | `../web-app/data/recordings`     |
//! | `PITCH_MODEL_PATH`          | no       | `models/crepe.onnx`              |
//! | `POLL_INTERVAL_SECS`        | no       | `5.0`                            |
//! | `PENDING_BATCH_SIZE`        | no       | `5`                              |
//! | `PITCH_PROFILE`             | no       | `tiny` (`tiny` \| `full`)        |
//! | `MONGO_ALLOW_INVALID_CERTS` | no       | derived from the endpoint        |
//!
//! A missing required variable is a fatal [`ConfigError`] — the process does
//! not start.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::pitch::EstimatorProfile;
use crate::store::TrustPolicy;

/// Seconds slept between poll passes when nothing overrides it.
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 5.0;

/// Records fetched per pass when nothing overrides it; small to bound
/// per-pass latency and memory.
pub const DEFAULT_BATCH_SIZE: i64 = 5;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Configuration failures.  All of these are fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("required environment variable {0} is not set")]
    MissingVar(&'static str),

    /// An environment variable is set but unparsable.
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// ProfileKind
// ---------------------------------------------------------------------------

/// Which estimator profile the worker runs with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProfileKind {
    /// Low-fidelity profile (50–800 Hz, 0.1 floor, mean aggregation).
    #[default]
    Tiny,
    /// High-fidelity profile (C1–C8, 0.8 floor, median aggregation).
    Full,
}

impl ProfileKind {
    /// The full parameter bundle for this profile.
    pub fn profile(self) -> EstimatorProfile {
        match self {
            ProfileKind::Tiny => EstimatorProfile::tiny(),
            ProfileKind::Full => EstimatorProfile::full(),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkerConfig
// ---------------------------------------------------------------------------

/// Resolved worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Document store connection string.
    pub mongo_uri: String,
    /// Database holding the `recordings` collection.
    pub mongo_db_name: String,
    /// Directory where the web app saves uploaded recordings.
    pub audio_dir: PathBuf,
    /// Path to the CREPE ONNX export.
    pub model_path: PathBuf,
    /// Sleep between poll passes.
    pub poll_interval: Duration,
    /// Maximum pending records fetched per pass.
    pub batch_size: i64,
    /// Estimator profile selection.
    pub profile: ProfileKind,
    /// Explicit TLS trust policy; `None` derives it from the endpoint.
    pub trust_policy: Option<TrustPolicy>,
}

impl WorkerConfig {
    /// Load configuration from the process environment, after loading any
    /// `.env` file in the working directory.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine; a present one populates the
        // environment before we read it.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an injected lookup function (useful for
    /// tests, which must not mutate the process environment).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mongo_uri = lookup("MONGO_URI").ok_or(ConfigError::MissingVar("MONGO_URI"))?;
        let mongo_db_name =
            lookup("MONGO_DB_NAME").ok_or(ConfigError::MissingVar("MONGO_DB_NAME"))?;

        let audio_dir = lookup("AUDIO_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("../web-app/data/recordings"));

        let model_path = lookup("PITCH_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("models/crepe.onnx"));

        let poll_interval = match lookup("POLL_INTERVAL_SECS") {
            None => Duration::from_secs_f64(DEFAULT_POLL_INTERVAL_SECS),
            Some(raw) => {
                let secs: f64 = raw.parse().map_err(|_| ConfigError::Invalid {
                    name: "POLL_INTERVAL_SECS",
                    value: raw.clone(),
                    reason: "expected a number of seconds".into(),
                })?;
                if !secs.is_finite() || secs < 0.0 {
                    return Err(ConfigError::Invalid {
                        name: "POLL_INTERVAL_SECS",
                        value: raw,
                        reason: "must be a finite, non-negative number".into(),
                    });
                }
                Duration::from_secs_f64(secs)
            }
        };

        let batch_size = match lookup("PENDING_BATCH_SIZE") {
            None => DEFAULT_BATCH_SIZE,
            Some(raw) => {
                let n: i64 = raw.parse().map_err(|_| ConfigError::Invalid {
                    name: "PENDING_BATCH_SIZE",
                    value: raw.clone(),
                    reason: "expected an integer".into(),
                })?;
                if n < 1 {
                    return Err(ConfigError::Invalid {
                        name: "PENDING_BATCH_SIZE",
                        value: raw,
                        reason: "must be at least 1".into(),
                    });
                }
                n
            }
        };

        let profile = match lookup("PITCH_PROFILE").as_deref() {
            None => ProfileKind::default(),
            Some("tiny") => ProfileKind::Tiny,
            Some("full") => ProfileKind::Full,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "PITCH_PROFILE",
                    value: other.to_string(),
                    reason: "expected `tiny` or `full`".into(),
                });
            }
        };

        let trust_policy = match lookup("MONGO_ALLOW_INVALID_CERTS").as_deref() {
            None => None,
            Some("true") | Some("1") => Some(TrustPolicy::AllowInvalidCertificates),
            Some("false") | Some("0") => Some(TrustPolicy::SystemRoots),
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "MONGO_ALLOW_INVALID_CERTS",
                    value: other.to_string(),
                    reason: "expected `true` or `false`".into(),
                });
            }
        };

        Ok(Self {
            mongo_uri,
            mongo_db_name,
            audio_dir,
            model_path,
            poll_interval,
            batch_size,
            profile,
            trust_policy,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn minimal_environment_uses_defaults() {
        let config = WorkerConfig::from_lookup(lookup_from(&[
            ("MONGO_URI", "mongodb://localhost:27017"),
            ("MONGO_DB_NAME", "recorder"),
        ]))
        .expect("config");

        assert_eq!(config.mongo_uri, "mongodb://localhost:27017");
        assert_eq!(config.mongo_db_name, "recorder");
        assert_eq!(config.audio_dir, PathBuf::from("../web-app/data/recordings"));
        assert_eq!(config.model_path, PathBuf::from("models/crepe.onnx"));
        assert_eq!(config.poll_interval, Duration::from_secs_f64(5.0));
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.profile, ProfileKind::Tiny);
        assert!(config.trust_policy.is_none());
    }

    #[test]
    fn missing_uri_is_fatal() {
        let err = WorkerConfig::from_lookup(lookup_from(&[("MONGO_DB_NAME", "recorder")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingVar("MONGO_URI"));
    }

    #[test]
    fn missing_db_name_is_fatal() {
        let err = WorkerConfig::from_lookup(lookup_from(&[(
            "MONGO_URI",
            "mongodb://localhost:27017",
        )]))
        .unwrap_err();
        assert_eq!(err, ConfigError::MissingVar("MONGO_DB_NAME"));
    }

    #[test]
    fn overrides_are_honoured() {
        let config = WorkerConfig::from_lookup(lookup_from(&[
            ("MONGO_URI", "mongodb://db:27017"),
            ("MONGO_DB_NAME", "recorder"),
            ("AUDIO_DIR", "/srv/recordings"),
            ("PITCH_MODEL_PATH", "/opt/models/crepe-full.onnx"),
            ("POLL_INTERVAL_SECS", "0.5"),
            ("PENDING_BATCH_SIZE", "20"),
            ("PITCH_PROFILE", "full"),
            ("MONGO_ALLOW_INVALID_CERTS", "false"),
        ]))
        .expect("config");

        assert_eq!(config.audio_dir, PathBuf::from("/srv/recordings"));
        assert_eq!(config.poll_interval, Duration::from_secs_f64(0.5));
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.profile, ProfileKind::Full);
        assert_eq!(config.trust_policy, Some(TrustPolicy::SystemRoots));
    }

    #[test]
    fn bad_interval_is_invalid() {
        let err = WorkerConfig::from_lookup(lookup_from(&[
            ("MONGO_URI", "mongodb://db"),
            ("MONGO_DB_NAME", "recorder"),
            ("POLL_INTERVAL_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "POLL_INTERVAL_SECS",
                ..
            }
        ));
    }

    #[test]
    fn negative_interval_is_invalid() {
        let err = WorkerConfig::from_lookup(lookup_from(&[
            ("MONGO_URI", "mongodb://db"),
            ("MONGO_DB_NAME", "recorder"),
            ("POLL_INTERVAL_SECS", "-2"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn unknown_profile_is_invalid() {
        let err = WorkerConfig::from_lookup(lookup_from(&[
            ("MONGO_URI", "mongodb://db"),
            ("MONGO_DB_NAME", "recorder"),
            ("PITCH_PROFILE", "medium"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "PITCH_PROFILE",
                ..
            }
        ));
    }

    #[test]
    fn zero_batch_size_is_invalid() {
        let err = WorkerConfig::from_lookup(lookup_from(&[
            ("MONGO_URI", "mongodb://db"),
            ("MONGO_DB_NAME", "recorder"),
            ("PENDING_BATCH_SIZE", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn profile_kinds_map_to_expected_bundles() {
        assert_eq!(ProfileKind::Tiny.profile().method, "crepe-tiny");
        assert_eq!(ProfileKind::Full.profile().method, "crepe-full");
    }
}
