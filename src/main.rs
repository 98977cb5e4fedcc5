//! Worker entry point.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`WorkerConfig`] from the environment — missing required values
//!    are fatal here, before anything else starts.
//! 3. Ensure the audio directory exists.
//! 4. Load the CREPE ONNX model — a missing model file is fatal too.
//! 5. Connect the record store (client opened once, lives for the process).
//! 6. Run the poll loop forever; only a store error escaping a pass ends
//!    the process.
//!
//! [`WorkerConfig`]: pitch_worker::config::WorkerConfig

use std::sync::Arc;

use anyhow::Context;
use pitch_worker::{
    audio::AudioNormalizer,
    config::WorkerConfig,
    pitch::{CrepeModel, PitchEstimator},
    store::MongoRecordStore,
    worker::{PitchPipeline, Poller},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("pitch worker starting up");

    // 2. Configuration
    let config = WorkerConfig::from_env().context("configuration")?;

    // 3. Audio directory (shared with the upload-handling web app)
    std::fs::create_dir_all(&config.audio_dir).with_context(|| {
        format!("creating audio directory {}", config.audio_dir.display())
    })?;

    // 4. Pitch model
    let model = CrepeModel::load(&config.model_path).with_context(|| {
        format!("loading pitch model from {}", config.model_path.display())
    })?;
    let profile = config.profile.profile();
    log::info!(
        "pitch model loaded: {} (profile {})",
        config.model_path.display(),
        profile.method
    );
    let estimator = PitchEstimator::new(Arc::new(model), profile);

    let pipeline = PitchPipeline::new(
        config.audio_dir.clone(),
        AudioNormalizer::default(),
        estimator,
    );

    // 5. Record store
    let store = MongoRecordStore::connect(&config)
        .await
        .context("connecting to the record store")?;

    log::info!(
        "watching for recordings in {} (poll interval {:?})",
        config.audio_dir.display(),
        config.poll_interval
    );

    // 6. Poll loop
    let poller = Poller::new(
        Arc::new(store),
        Arc::new(pipeline),
        config.poll_interval,
        config.batch_size,
    );
    poller.run().await.context("poll loop")?;

    Ok(())
}
