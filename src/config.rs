use std::{env, path::PathBuf, time::Duration};

/// Upper bound on frames handed to the analysis pipeline per second.
pub const TARGET_FPS: u32 = 15;

/// Sliding-window length for the temporal verdict smoother.
pub const SMOOTHING_BUFFER_SIZE: usize = 5;

/// Minimum hand-presence score before landmarks are trusted.
pub const MIN_HAND_CONFIDENCE: f32 = 0.5;

const DEFAULT_MODEL_DIR: &str = "models";

#[derive(Clone, Debug)]
pub struct AnalyzerConfig {
    /// Backend base URL for threshold refresh and record submission.
    /// `None` runs fully offline on the bundled fallback threshold.
    pub api_base_url: Option<String>,
    pub model_dir: PathBuf,
    pub target_fps: u32,
    pub smoothing_window: usize,
    /// Account the practice record is submitted for, if any.
    pub user_id: Option<i64>,
    /// Length of the headless practice run driven by the binary.
    pub practice_seconds: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            target_fps: TARGET_FPS,
            smoothing_window: SMOOTHING_BUFFER_SIZE,
            user_id: None,
            practice_seconds: 60,
        }
    }
}

impl AnalyzerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let api_base_url = env::var("MODIGRIP_API_URL")
            .ok()
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
        let model_dir = env::var("MODIGRIP_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.model_dir);
        let target_fps = env::var("MODIGRIP_TARGET_FPS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .filter(|fps| *fps > 0)
            .unwrap_or(defaults.target_fps);
        let user_id = env::var("MODIGRIP_USER_ID")
            .ok()
            .and_then(|raw| raw.parse().ok());
        let practice_seconds = env::var("MODIGRIP_PRACTICE_SECS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(defaults.practice_seconds);

        Self {
            api_base_url,
            model_dir,
            target_fps,
            smoothing_window: defaults.smoothing_window,
            user_id,
            practice_seconds,
        }
    }

    /// Minimum spacing between two accepted frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1_000 / u64::from(self.target_fps.max(1)))
    }
}
