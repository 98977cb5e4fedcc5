//! Pitch estimation: the neural model boundary, the confidence-filtered
//! estimator on top of it, and frequency → note-name mapping.
//!
//! The model itself is opaque behind [`PitchModel`]; everything this module
//! adds — framing, search-band restriction, median smoothing, confidence
//! thresholding, aggregation — is deterministic Rust on either side of that
//! boundary.

pub mod estimate;
pub mod model;
pub mod note;

pub use estimate::{Aggregation, EstimatorProfile, PitchEstimate, PitchEstimator};
pub use model::{CrepeModel, PitchError, PitchFrames, PitchModel, CREPE_SAMPLE_RATE};
pub use note::hz_to_note;
