pub mod api;
pub mod autoencoder;
pub mod classify;
pub mod config;
pub mod detector;
pub mod error;
pub mod model_fetch;
pub mod normalize;
pub mod pipeline;
pub mod session;
pub mod threshold;
pub mod types;

pub use error::AnalyzerError;
