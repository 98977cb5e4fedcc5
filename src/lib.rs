//! Background worker that estimates the musical pitch of uploaded
//! recordings.
//!
//! The web app stores clips and creates `pending` documents in a shared
//! MongoDB collection; this worker polls that collection, normalizes each
//! clip to mono 16 kHz WAV via ffmpeg, runs a CREPE-style neural pitch
//! tracker over it, reduces the per-frame output to one (frequency,
//! confidence) pair, maps the frequency to a note name, and writes the
//! result — or the error — back to the document.
//!
//! Subsystem layout:
//!
//! - [`config`] — environment-driven worker configuration.
//! - [`audio`]  — ffmpeg normalization and WAV loading.
//! - [`pitch`]  — model boundary, estimator profiles, note mapping.
//! - [`store`]  — the `Recording` document model and the MongoDB gateway.
//! - [`worker`] — the analysis pipeline and the poll loop.

pub mod audio;
pub mod config;
pub mod pitch;
pub mod store;
pub mod worker;
