//! Work queue polling: discover pending recordings, drive the analysis
//! pipeline, write results back.
//!
//! # Model
//!
//! A single [`Poller`] loops forever: one pass over the pending batch, then
//! a fixed sleep, regardless of whether work was found.  Within a pass,
//! records are processed strictly one at a time; the analysis itself is
//! blocking (ffmpeg, WAV decode, inference) and runs under
//! `spawn_blocking`.
//!
//! Per-record failures are isolated: they become a `status: "error"`
//! write-back and the pass continues.  Store failures — finding the batch
//! or writing a result back — escape the pass and terminate the worker;
//! there is no point polling a database we cannot write to.

pub mod pipeline;

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::store::{RecordStore, StoreError};

pub use pipeline::{AnalysisError, PitchPipeline, RecordingAnalyzer};

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

/// Polls the record store and dispatches pending recordings to the
/// analyzer.
pub struct Poller {
    store: Arc<dyn RecordStore>,
    analyzer: Arc<dyn RecordingAnalyzer>,
    poll_interval: Duration,
    batch_size: i64,
}

impl Poller {
    pub fn new(
        store: Arc<dyn RecordStore>,
        analyzer: Arc<dyn RecordingAnalyzer>,
        poll_interval: Duration,
        batch_size: i64,
    ) -> Self {
        Self {
            store,
            analyzer,
            poll_interval,
            batch_size,
        }
    }

    /// Run the poll loop until a store error makes it fatal.
    ///
    /// There is no in-band termination: the process is expected to be
    /// stopped by a signal between passes.
    pub async fn run(&self) -> Result<(), StoreError> {
        loop {
            self.pass().await?;
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Execute one poll pass.  Returns how many records were processed.
    ///
    /// Each record in the batch is transitioned exactly once, to `done` or
    /// to `error`; a panic inside the analysis task is captured as a
    /// per-record error rather than taking the worker down.
    pub async fn pass(&self) -> Result<usize, StoreError> {
        let pending = self.store.find_pending(self.batch_size).await?;
        if pending.is_empty() {
            debug!("no pending recordings");
            return Ok(0);
        }

        info!("found {} pending recording(s)", pending.len());

        for recording in &pending {
            let analyzer = Arc::clone(&self.analyzer);
            let record = recording.clone();
            let outcome =
                tokio::task::spawn_blocking(move || analyzer.analyze(&record)).await;

            match outcome {
                Ok(Ok(analysis)) => {
                    info!(
                        "recording {} -> {} ({:.1} Hz)",
                        recording.id, analysis.pitch_note, analysis.pitch_hz
                    );
                    self.store.mark_done(recording.id, &analysis).await?;
                }
                Ok(Err(e)) => {
                    warn!("recording {} failed: {e}", recording.id);
                    self.store.mark_error(recording.id, &e.to_string()).await?;
                }
                Err(join_error) => {
                    warn!(
                        "analysis task for recording {} aborted: {join_error}",
                        recording.id
                    );
                    self.store
                        .mark_error(
                            recording.id,
                            &format!("analysis task aborted: {join_error}"),
                        )
                        .await?;
                }
            }
        }

        Ok(pending.len())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Analysis, Recording, Status};
    use async_trait::async_trait;
    use mongodb::bson::oid::ObjectId;
    use std::sync::Mutex;

    // --- MockStore ---

    #[derive(Default)]
    struct MockStore {
        pending: Mutex<Vec<Recording>>,
        done: Mutex<Vec<(ObjectId, Analysis)>>,
        errors: Mutex<Vec<(ObjectId, String)>>,
    }

    impl MockStore {
        fn with_pending(records: Vec<Recording>) -> Self {
            Self {
                pending: Mutex::new(records),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl RecordStore for MockStore {
        async fn find_pending(&self, limit: i64) -> Result<Vec<Recording>, StoreError> {
            let mut pending = self.pending.lock().unwrap();
            let take = (limit as usize).min(pending.len());
            Ok(pending.drain(..take).collect())
        }

        async fn mark_done(
            &self,
            id: ObjectId,
            analysis: &Analysis,
        ) -> Result<(), StoreError> {
            self.done.lock().unwrap().push((id, analysis.clone()));
            Ok(())
        }

        async fn mark_error(&self, id: ObjectId, message: &str) -> Result<(), StoreError> {
            self.errors.lock().unwrap().push((id, message.to_string()));
            Ok(())
        }
    }

    // --- Mock analyzers ---

    struct SucceedingAnalyzer;

    impl RecordingAnalyzer for SucceedingAnalyzer {
        fn analyze(&self, _recording: &Recording) -> Result<Analysis, AnalysisError> {
            Ok(Analysis {
                pitch_hz: 220.0,
                pitch_note: "A3".into(),
                confidence: 0.85,
                method: "crepe-tiny".into(),
            })
        }
    }

    struct FailingAnalyzer;

    impl RecordingAnalyzer for FailingAnalyzer {
        fn analyze(&self, recording: &Recording) -> Result<Analysis, AnalysisError> {
            Err(AnalysisError::FileNotFound {
                path: format!("/audio/{}", recording.audio_filename.as_deref().unwrap_or("?")),
            })
        }
    }

    struct PanickingAnalyzer;

    impl RecordingAnalyzer for PanickingAnalyzer {
        fn analyze(&self, _recording: &Recording) -> Result<Analysis, AnalysisError> {
            panic!("inference exploded");
        }
    }

    fn pending_recording(filename: &str) -> Recording {
        Recording {
            id: ObjectId::new(),
            audio_filename: Some(filename.to_string()),
            status: Status::Pending,
            analysis: None,
            error_message: None,
            created_at: Some(mongodb::bson::DateTime::now()),
            updated_at: None,
        }
    }

    fn poller(store: Arc<MockStore>, analyzer: Arc<dyn RecordingAnalyzer>) -> Poller {
        Poller::new(store, analyzer, Duration::from_secs(5), 5)
    }

    // --- pass() behaviour ---

    #[tokio::test]
    async fn empty_queue_is_a_no_op() {
        let store = Arc::new(MockStore::default());
        let p = poller(Arc::clone(&store), Arc::new(SucceedingAnalyzer));

        let processed = p.pass().await.expect("pass");

        assert_eq!(processed, 0);
        assert!(store.done.lock().unwrap().is_empty());
        assert!(store.errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn successful_analysis_marks_done_with_note() {
        let rec = pending_recording("clip.webm");
        let id = rec.id;
        let store = Arc::new(MockStore::with_pending(vec![rec]));
        let p = poller(Arc::clone(&store), Arc::new(SucceedingAnalyzer));

        let processed = p.pass().await.expect("pass");
        assert_eq!(processed, 1);

        let done = store.done.lock().unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].0, id);
        assert_eq!(done[0].1.pitch_note, "A3");
        assert!(store.errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_analysis_marks_error_with_message() {
        let rec = pending_recording("gone.webm");
        let id = rec.id;
        let store = Arc::new(MockStore::with_pending(vec![rec]));
        let p = poller(Arc::clone(&store), Arc::new(FailingAnalyzer));

        p.pass().await.expect("pass");

        let errors = store.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, id);
        assert!(errors[0].1.contains("Audio file not found at"));
        assert!(errors[0].1.contains("gone.webm"));
        assert!(store.done.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_bad_record_does_not_block_the_batch() {
        let good = pending_recording("good.webm");
        let bad = pending_recording("bad.webm");
        let good_id = good.id;

        // Analyzer that fails only for bad.webm.
        struct Selective;
        impl RecordingAnalyzer for Selective {
            fn analyze(&self, recording: &Recording) -> Result<Analysis, AnalysisError> {
                if recording.audio_filename.as_deref() == Some("bad.webm") {
                    Err(AnalysisError::FileNotFound {
                        path: "/audio/bad.webm".into(),
                    })
                } else {
                    Ok(Analysis {
                        pitch_hz: 440.0,
                        pitch_note: "A4".into(),
                        confidence: 0.9,
                        method: "crepe-tiny".into(),
                    })
                }
            }
        }

        let store = Arc::new(MockStore::with_pending(vec![bad, good]));
        let p = poller(Arc::clone(&store), Arc::new(Selective));

        let processed = p.pass().await.expect("pass");
        assert_eq!(processed, 2);

        assert_eq!(store.errors.lock().unwrap().len(), 1);
        let done = store.done.lock().unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].0, good_id);
    }

    #[tokio::test]
    async fn panicking_analysis_is_captured_per_record() {
        let rec = pending_recording("clip.webm");
        let id = rec.id;
        let store = Arc::new(MockStore::with_pending(vec![rec]));
        let p = poller(Arc::clone(&store), Arc::new(PanickingAnalyzer));

        p.pass().await.expect("pass survives the panic");

        let errors = store.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, id);
        assert!(errors[0].1.contains("analysis task aborted"));
    }

    #[tokio::test]
    async fn batch_size_caps_a_pass() {
        let records: Vec<Recording> = (0..8)
            .map(|i| pending_recording(&format!("clip-{i}.webm")))
            .collect();
        let store = Arc::new(MockStore::with_pending(records));
        let p = Poller::new(
            Arc::clone(&store) as Arc<dyn RecordStore>,
            Arc::new(SucceedingAnalyzer),
            Duration::from_secs(5),
            5,
        );

        assert_eq!(p.pass().await.expect("pass"), 5);
        assert_eq!(p.pass().await.expect("pass"), 3);
        assert_eq!(p.pass().await.expect("pass"), 0);
        assert_eq!(store.done.lock().unwrap().len(), 8);
    }
}
