use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::{
    autoencoder::InferenceEngine,
    classify::{TemporalSmoother, classify_grip, reconstruction_error},
    detector::PoseDetector,
    normalize::normalize_keypoints,
    session::SessionAggregator,
    threshold::ThresholdStore,
    types::{DecisionEvent, Frame, FrameVerdict},
};

/// How long the worker waits for a frame before re-checking the stop flag.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// What one scheduler iteration did with its frame.
#[derive(Clone, Debug)]
pub enum TickOutcome {
    /// Frame arrived before the per-frame budget elapsed; nothing ran.
    Throttled,
    /// No hand in the frame (or the detector failed); display cleared.
    NoHand,
    /// Inference failed; the previous published verdict stands.
    Skipped,
    Judged(FrameVerdict),
}

/// Drives the per-frame analysis cycle.
///
/// Owns the detector, the inference engine, the smoothing window and the
/// published decision; all of them are touched only from the scheduling
/// context. `tick` runs exactly one iteration to completion, so a slow
/// inference call delays the next frame instead of overlapping it.
pub struct FrameScheduler {
    detector: Box<dyn PoseDetector + Send>,
    engine: Box<dyn InferenceEngine + Send>,
    thresholds: Arc<ThresholdStore>,
    session: Arc<SessionAggregator>,
    smoother: TemporalSmoother,
    decision_tx: Sender<DecisionEvent>,
    frame_interval: Duration,
    epoch: Instant,
    last_accepted: Option<Instant>,
    hand_detected: bool,
    last_verdict: Option<FrameVerdict>,
}

impl FrameScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        detector: Box<dyn PoseDetector + Send>,
        engine: Box<dyn InferenceEngine + Send>,
        thresholds: Arc<ThresholdStore>,
        session: Arc<SessionAggregator>,
        smoothing_window: usize,
        frame_interval: Duration,
        decision_tx: Sender<DecisionEvent>,
    ) -> Self {
        Self {
            detector,
            engine,
            thresholds,
            session,
            smoother: TemporalSmoother::new(smoothing_window),
            decision_tx,
            frame_interval,
            epoch: Instant::now(),
            last_accepted: None,
            hand_detected: false,
            last_verdict: None,
        }
    }

    /// Run one iteration against `frame`, observed at `now`.
    pub fn tick(&mut self, frame: &Frame, now: Instant) -> TickOutcome {
        if let Some(last) = self.last_accepted {
            if now.duration_since(last) < self.frame_interval {
                return TickOutcome::Throttled;
            }
        }
        self.last_accepted = Some(now);

        let timestamp_ms = now.duration_since(self.epoch).as_millis() as u64;
        let pose = match self.detector.detect(frame, timestamp_ms) {
            Ok(Some(pose)) => pose,
            Ok(None) => {
                self.hand_lost();
                return TickOutcome::NoHand;
            }
            Err(err) => {
                // A failed detector call reads the same as an empty frame.
                log::warn!("hand detection failed, treating as miss: {err}");
                self.hand_lost();
                return TickOutcome::NoHand;
            }
        };

        self.hand_detected = true;
        let features = normalize_keypoints(&pose);
        let reconstructed = match self.engine.reconstruct(&features) {
            Ok(reconstructed) => reconstructed,
            Err(err) => {
                log::warn!("inference failed, skipping frame: {err}");
                return TickOutcome::Skipped;
            }
        };

        let error = reconstruction_error(&features, &reconstructed);
        let assessment = classify_grip(error, self.thresholds.value());

        self.smoother.push(assessment.is_correct);
        let verdict = FrameVerdict {
            is_correct: self.smoother.decide(),
            confidence: assessment.confidence,
            reconstruction_error: error,
            timestamp: frame.timestamp,
        };

        self.last_verdict = Some(verdict.clone());
        let _ = self
            .decision_tx
            .try_send(DecisionEvent::Verdict(verdict.clone()));

        // The session counts raw per-frame flags, not the smoothed verdict.
        self.session.record_frame(assessment.is_correct);

        TickOutcome::Judged(verdict)
    }

    pub fn last_verdict(&self) -> Option<&FrameVerdict> {
        self.last_verdict.as_ref()
    }

    pub fn hand_detected(&self) -> bool {
        self.hand_detected
    }

    /// Clear all per-run state: smoothing window, published decision and the
    /// hand-detected flag. Called when the scheduler stops.
    pub fn reset(&mut self) {
        self.smoother.reset();
        self.last_accepted = None;
        self.last_verdict = None;
        self.hand_detected = false;
        let _ = self.decision_tx.try_send(DecisionEvent::Cleared);
    }

    fn hand_lost(&mut self) {
        self.last_verdict = None;
        if self.hand_detected {
            self.hand_detected = false;
            let _ = self.decision_tx.try_send(DecisionEvent::HandLost);
        }
    }
}

#[derive(Debug)]
pub struct SchedulerHandle {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Run the scheduler on its own worker thread, one tick per delivered frame.
///
/// Frames queued while a tick is running collapse to the newest one, so a
/// slow inference call never builds a backlog. Stopping flips the flag; the
/// in-flight tick finishes and its state is then cleared.
pub fn start_scheduler(
    mut scheduler: FrameScheduler,
    frame_rx: Receiver<Frame>,
) -> SchedulerHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = thread::spawn(move || {
        while !stop_flag.load(Ordering::Relaxed) {
            let frame = match frame_rx.recv_timeout(IDLE_POLL) {
                Ok(frame) => frame,
                // Source paused or not yet producing; keep scheduling.
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            let frame = drain_to_latest(&frame_rx, frame);
            scheduler.tick(&frame, Instant::now());
        }
        scheduler.reset();
    });

    SchedulerHandle {
        stop,
        handle: Some(handle),
    }
}

fn drain_to_latest(frame_rx: &Receiver<Frame>, mut frame: Frame) -> Frame {
    while let Ok(newer) = frame_rx.try_recv() {
        frame = newer;
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use crossbeam_channel::bounded;

    use crate::{
        error::AnalyzerError,
        types::{HandPose, Landmark, NUM_LANDMARKS},
    };

    struct ScriptedDetector {
        script: VecDeque<Result<Option<HandPose>, AnalyzerError>>,
    }

    impl PoseDetector for ScriptedDetector {
        fn detect(
            &mut self,
            _frame: &Frame,
            _timestamp_ms: u64,
        ) -> Result<Option<HandPose>, AnalyzerError> {
            self.script.pop_front().unwrap_or(Ok(None))
        }
    }

    /// Reconstructs the input shifted by a scripted offset, so one tick's
    /// reconstruction error is exactly offset².
    struct OffsetEngine {
        script: VecDeque<Result<f32, AnalyzerError>>,
    }

    impl InferenceEngine for OffsetEngine {
        fn reconstruct(
            &mut self,
            input: &crate::types::FeatureVector,
        ) -> Result<crate::types::FeatureVector, AnalyzerError> {
            let offset = self
                .script
                .pop_front()
                .unwrap_or(Err(AnalyzerError::Inference("script exhausted".into())))?;
            let mut output = *input;
            for value in output.iter_mut() {
                *value += offset;
            }
            Ok(output)
        }
    }

    fn poses(n: usize) -> Vec<Result<Option<HandPose>, AnalyzerError>> {
        (0..n).map(|_| Ok(Some(pose()))).collect()
    }

    fn offsets(values: &[f32]) -> Vec<Result<f32, AnalyzerError>> {
        values.iter().map(|offset| Ok(*offset)).collect()
    }

    fn pose() -> HandPose {
        let mut landmarks = [Landmark::new(0.0, 0.0, 0.0); NUM_LANDMARKS];
        for (i, landmark) in landmarks.iter_mut().enumerate() {
            *landmark = Landmark::new(0.3 + i as f32 * 0.01, 0.5, 0.01);
        }
        HandPose::new(landmarks)
    }

    fn frame() -> Frame {
        Frame {
            rgba: Vec::new(),
            width: 0,
            height: 0,
            timestamp: Instant::now(),
        }
    }

    const THRESHOLD: f64 = 0.00729;
    // offset 0.2 → error 0.04, far past the threshold.
    const BAD: f32 = 0.2;

    fn scheduler_with(
        detector: Vec<Result<Option<HandPose>, AnalyzerError>>,
        engine: Vec<Result<f32, AnalyzerError>>,
        window: usize,
        session: Arc<SessionAggregator>,
    ) -> (FrameScheduler, Receiver<DecisionEvent>) {
        let (decision_tx, decision_rx) = bounded(64);
        let scheduler = FrameScheduler::new(
            Box::new(ScriptedDetector {
                script: detector.into(),
            }),
            Box::new(OffsetEngine {
                script: engine.into(),
            }),
            Arc::new(ThresholdStore::new(THRESHOLD).unwrap()),
            session,
            window,
            Duration::from_millis(66),
            decision_tx,
        );
        (scheduler, decision_rx)
    }

    #[test]
    fn test_tick_throttles_frames_above_target_fps() {
        let session = Arc::new(SessionAggregator::new());
        let (mut scheduler, _rx) =
            scheduler_with(poses(2), offsets(&[0.0, 0.0]), 5, session);

        let t0 = Instant::now();
        assert!(matches!(
            scheduler.tick(&frame(), t0),
            TickOutcome::Judged(_)
        ));
        assert!(matches!(
            scheduler.tick(&frame(), t0 + Duration::from_millis(10)),
            TickOutcome::Throttled
        ));
        assert!(matches!(
            scheduler.tick(&frame(), t0 + Duration::from_millis(70)),
            TickOutcome::Judged(_)
        ));
    }

    #[test]
    fn test_miss_clears_published_decision() {
        let session = Arc::new(SessionAggregator::new());
        let (mut scheduler, rx) = scheduler_with(
            vec![Ok(Some(pose())), Ok(None)],
            offsets(&[0.0]),
            5,
            session,
        );

        let t0 = Instant::now();
        scheduler.tick(&frame(), t0);
        assert!(scheduler.hand_detected());
        assert!(scheduler.last_verdict().is_some());

        let outcome = scheduler.tick(&frame(), t0 + Duration::from_millis(100));
        assert!(matches!(outcome, TickOutcome::NoHand));
        assert!(!scheduler.hand_detected());
        assert!(scheduler.last_verdict().is_none());

        assert!(matches!(rx.try_recv(), Ok(DecisionEvent::Verdict(_))));
        assert!(matches!(rx.try_recv(), Ok(DecisionEvent::HandLost)));
    }

    #[test]
    fn test_detector_failure_treated_as_miss() {
        let session = Arc::new(SessionAggregator::new());
        let (mut scheduler, _rx) = scheduler_with(
            vec![Err(AnalyzerError::Detection("boom".into()))],
            vec![],
            5,
            session,
        );

        assert!(matches!(
            scheduler.tick(&frame(), Instant::now()),
            TickOutcome::NoHand
        ));
    }

    #[test]
    fn test_inference_failure_retains_previous_verdict() {
        let session = Arc::new(SessionAggregator::new());
        let (mut scheduler, rx) = scheduler_with(
            poses(2),
            vec![Ok(0.0), Err(AnalyzerError::Inference("engine down".into()))],
            5,
            session.clone(),
        );
        session.start().unwrap();

        let t0 = Instant::now();
        scheduler.tick(&frame(), t0);
        let published = scheduler.last_verdict().cloned().unwrap();

        let outcome = scheduler.tick(&frame(), t0 + Duration::from_millis(100));
        assert!(matches!(outcome, TickOutcome::Skipped));
        let retained = scheduler.last_verdict().unwrap();
        assert_eq!(retained.is_correct, published.is_correct);

        // Only the first tick published and only the first tick counted.
        assert!(matches!(rx.try_recv(), Ok(DecisionEvent::Verdict(_))));
        assert!(rx.try_recv().is_err());
        assert_eq!(session.progress(), (1, 1));
        session.stop();
    }

    #[test]
    fn test_verdict_is_majority_over_window() {
        let session = Arc::new(SessionAggregator::new());
        let (mut scheduler, _rx) = scheduler_with(
            poses(3),
            offsets(&[0.0, BAD, 0.0]),
            3,
            session,
        );

        let t0 = Instant::now();
        let mut last = TickOutcome::Throttled;
        for i in 0..3 {
            last = scheduler.tick(&frame(), t0 + Duration::from_millis(100 * i));
        }

        // Per-frame flags were [correct, incorrect, correct]: 2 of 3.
        match last {
            TickOutcome::Judged(verdict) => {
                assert!(verdict.is_correct);
                assert!((verdict.confidence - 1.0).abs() < 1e-9);
            }
            other => panic!("expected judged tick, got {other:?}"),
        }
    }

    #[test]
    fn test_session_receives_per_frame_flags_not_smoothed() {
        let session = Arc::new(SessionAggregator::new());
        session.start().unwrap();
        let (mut scheduler, _rx) = scheduler_with(
            poses(3),
            offsets(&[0.0, BAD, BAD]),
            5,
            session.clone(),
        );

        let t0 = Instant::now();
        for i in 0..3 {
            scheduler.tick(&frame(), t0 + Duration::from_millis(100 * i));
        }

        // One raw-correct frame of three, even though no smoothed verdict
        // was ever correct with a 5-wide window.
        assert_eq!(session.progress(), (1, 3));
        session.stop();
    }

    #[test]
    fn test_no_active_session_counts_nothing() {
        let session = Arc::new(SessionAggregator::new());
        let (mut scheduler, _rx) =
            scheduler_with(poses(1), offsets(&[0.0]), 5, session.clone());

        scheduler.tick(&frame(), Instant::now());
        assert_eq!(session.progress(), (0, 0));
    }

    #[test]
    fn test_reset_clears_state_and_publishes() {
        let session = Arc::new(SessionAggregator::new());
        let (mut scheduler, rx) =
            scheduler_with(poses(1), offsets(&[0.0]), 5, session);

        scheduler.tick(&frame(), Instant::now());
        scheduler.reset();

        assert!(scheduler.last_verdict().is_none());
        assert!(!scheduler.hand_detected());
        assert!(matches!(rx.try_recv(), Ok(DecisionEvent::Verdict(_))));
        assert!(matches!(rx.try_recv(), Ok(DecisionEvent::Cleared)));
    }

    #[test]
    fn test_worker_loop_stops_cleanly() {
        let session = Arc::new(SessionAggregator::new());
        let (scheduler, rx) =
            scheduler_with(poses(8), offsets(&[0.0; 8]), 5, session);

        let (frame_tx, frame_rx) = bounded(1);
        let handle = start_scheduler(scheduler, frame_rx);
        frame_tx.send(frame()).unwrap();
        handle.stop();

        // The worker's final act is clearing the published state.
        let mut saw_cleared = false;
        while let Ok(event) = rx.try_recv() {
            saw_cleared = matches!(event, DecisionEvent::Cleared);
        }
        assert!(saw_cleared);
    }
}
