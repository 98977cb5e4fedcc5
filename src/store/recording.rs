//! The `Recording` document and its analysis lifecycle types.
//!
//! One document per uploaded clip.  The upload-handling web app creates
//! records with status `pending`; this worker is the only writer that moves
//! them to `done` or `error`.  Nothing deletes records here.

use mongodb::bson::oid::ObjectId;
use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Analysis lifecycle state of a recording.
///
/// `pending → done` on success, `pending → error` on failure; both are
/// terminal — an `error` record requires external intervention (a manual
/// status reset) to be retried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Awaiting analysis.
    #[default]
    Pending,
    /// Analyzed successfully; `analysis` is populated.
    Done,
    /// Analysis failed; `error_message` is populated.
    Error,
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Successful analysis result persisted on a `done` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Estimated fundamental frequency in Hz; always > 0.
    pub pitch_hz: f64,
    /// Note-octave name for `pitch_hz`, e.g. `"A4"`.
    pub pitch_note: String,
    /// Aggregated voicing confidence in [0, 1].
    pub confidence: f64,
    /// Tag identifying which estimator variant produced this result.
    pub method: String,
}

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

/// One uploaded clip and its analysis state, as stored in the `recordings`
/// collection.
///
/// Fields other than `_id` default when absent so that documents written by
/// older versions of the web app still deserialize; a missing
/// `audio_filename` is handled as a per-record error downstream, not a
/// decode failure here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    /// Store-assigned identity.
    #[serde(rename = "_id")]
    pub id: ObjectId,

    /// Relative reference to the raw audio file under the audio root;
    /// immutable after creation.
    #[serde(default)]
    pub audio_filename: Option<String>,

    #[serde(default)]
    pub status: Status,

    /// Present iff `status` is `done`.
    #[serde(default)]
    pub analysis: Option<Analysis>,

    /// Present iff `status` is `error`.
    #[serde(default)]
    pub error_message: Option<String>,

    #[serde(default)]
    pub created_at: Option<DateTime>,

    #[serde(default)]
    pub updated_at: Option<DateTime>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
