use thiserror::Error;

/// Failure taxonomy for the analysis core.
///
/// `ModelLoad` and `Capture` are fatal for starting analysis and require an
/// explicit re-initialization; the per-frame kinds (`Detection`, `Inference`,
/// `ThresholdFetch`) are logged and skipped, the next scheduled tick is the
/// retry.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("model failed to load: {0}")]
    ModelLoad(String),

    #[error("camera capture unavailable: {0}")]
    Capture(String),

    #[error("hand detection failed: {0}")]
    Detection(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("threshold fetch failed: {0}")]
    ThresholdFetch(String),

    #[error("backend request failed: {0}")]
    Api(String),

    #[error("invalid session transition: {0}")]
    Session(&'static str),

    #[error("threshold must be positive and finite, got {0}")]
    InvalidThreshold(f64),
}
