use anyhow::Result;

fn main() -> Result<()> {
    env_logger::init();
    run()
}

#[cfg(feature = "camera-nokhwa")]
fn run() -> Result<()> {
    use std::{sync::Arc, time::Duration};

    use anyhow::Context;
    use crossbeam_channel::{after, bounded, select};
    use modigrip_analyzer::{
        api::ApiClient,
        autoencoder::{self, GripAutoencoder},
        config::{AnalyzerConfig, MIN_HAND_CONFIDENCE},
        detector::OrtPoseDetector,
        model_fetch::{self, ModelKind},
        pipeline::{self, FrameScheduler},
        session::SessionAggregator,
        threshold::ThresholdStore,
        types::{DecisionEvent, FrameVerdict, PracticeRecord},
    };

    let config = AnalyzerConfig::from_env();
    model_fetch::ensure_models_ready(&config)?;

    let meta =
        autoencoder::load_model_meta(&ModelKind::AutoencoderMeta.path_in(&config.model_dir))?;
    let thresholds = Arc::new(ThresholdStore::new(meta.threshold_train95)?);

    let api = match &config.api_base_url {
        Some(base) => Some(ApiClient::new(base.clone())?),
        None => None,
    };
    if let Some(api) = &api {
        thresholds.refresh(api);
    }

    let detector = OrtPoseDetector::load(
        &ModelKind::HandLandmarker.path_in(&config.model_dir),
        MIN_HAND_CONFIDENCE,
    )?;
    let engine = GripAutoencoder::load(&ModelKind::GripAutoencoder.path_in(&config.model_dir))?;

    let cameras = pipeline::available_cameras().context("failed to enumerate cameras")?;
    let device = cameras.into_iter().next().context("no camera available")?;
    log::info!("capturing from {}", device.label);

    let (frame_tx, frame_rx) = bounded(1);
    let capture = pipeline::start_capture(device.index, frame_tx)?;

    let session = Arc::new(SessionAggregator::new());
    session.start()?;

    let (decision_tx, decision_rx) = bounded(16);
    let scheduler = FrameScheduler::new(
        Box::new(detector),
        Box::new(engine),
        thresholds,
        session.clone(),
        config.smoothing_window,
        config.frame_interval(),
        decision_tx,
    );
    let worker = pipeline::start_scheduler(scheduler, frame_rx);

    log::info!("practicing for {}s", config.practice_seconds);
    let deadline = after(Duration::from_secs(config.practice_seconds));
    let mut last_verdict: Option<FrameVerdict> = None;
    loop {
        select! {
            recv(decision_rx) -> event => match event {
                Ok(DecisionEvent::Verdict(verdict)) => {
                    log::info!(
                        "grip {} (confidence {:.0}%, error {:.5})",
                        if verdict.is_correct { "correct" } else { "incorrect" },
                        verdict.confidence * 100.0,
                        verdict.reconstruction_error,
                    );
                    last_verdict = Some(verdict);
                }
                Ok(DecisionEvent::HandLost) => log::info!("hand not detected"),
                Ok(DecisionEvent::Cleared) => {}
                Err(_) => break,
            },
            recv(deadline) -> _ => break,
        }
    }

    capture.stop();
    worker.stop();

    let summary = session.stop().context("no session was running")?;
    log::info!(
        "session finished: {}s, {}/{} frames correct ({}%)",
        summary.elapsed_seconds,
        summary.correct_frames,
        summary.total_frames,
        summary.correct_rate(),
    );

    if let (Some(api), Some(user_id), Some(verdict)) = (&api, config.user_id, &last_verdict) {
        let record = PracticeRecord {
            is_correct: verdict.is_correct,
            mse_score: verdict.reconstruction_error,
            confidence: verdict.confidence,
            duration_seconds: summary.elapsed_seconds as u32,
            correct_rate: summary.correct_rate(),
        };
        match api.submit_record(user_id, &record) {
            Ok(()) => log::info!("practice record submitted for user {user_id}"),
            Err(err) => log::warn!("failed to submit practice record: {err}"),
        }
    }

    Ok(())
}

#[cfg(not(feature = "camera-nokhwa"))]
fn run() -> Result<()> {
    anyhow::bail!("built without a capture backend; enable the camera-nokhwa feature")
}
