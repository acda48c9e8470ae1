use std::{fs, path::Path};

use ndarray::Array2;
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::Tensor,
};
use serde::Deserialize;

use crate::{
    error::AnalyzerError,
    types::{FEATURE_LEN, FeatureVector},
};

/// Fixed-length reconstruction contract consumed by the scheduler.
///
/// Implementations take the normalized 63-float feature vector and return
/// the reconstructed vector of the same length; a wrong-length output is an
/// error, never a truncated result.
pub trait InferenceEngine {
    fn reconstruct(&mut self, input: &FeatureVector) -> Result<FeatureVector, AnalyzerError>;
}

/// Metadata exported alongside the trained autoencoder.
///
/// `threshold_train95` is the reconstruction-error cutoff covering 95% of
/// the correct-grip training set; it seeds the threshold store's fallback.
#[derive(Clone, Debug, Deserialize)]
pub struct ModelMeta {
    pub arch: Vec<usize>,
    pub threshold_train95: f64,
    #[serde(default)]
    pub coverage_val: f64,
    #[serde(default)]
    pub coverage_test: f64,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub epochs: u32,
    #[serde(default)]
    pub batch_size: u32,
    #[serde(default)]
    pub lr: f64,
}

pub fn load_model_meta(path: &Path) -> Result<ModelMeta, AnalyzerError> {
    let raw = fs::read_to_string(path).map_err(|err| {
        AnalyzerError::ModelLoad(format!("model metadata {}: {err}", path.display()))
    })?;
    serde_json::from_str(&raw).map_err(|err| {
        AnalyzerError::ModelLoad(format!("model metadata {}: {err}", path.display()))
    })
}

/// Grip autoencoder over ONNX Runtime: input `keypoints` (1×63), output the
/// reconstructed vector (1×63).
pub struct GripAutoencoder {
    session: Session,
}

impl GripAutoencoder {
    pub fn load(model_path: &Path) -> Result<Self, AnalyzerError> {
        let session = Session::builder()
            .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|builder| builder.with_intra_threads(1))
            .and_then(|builder| builder.commit_from_file(model_path))
            .map_err(|err| {
                AnalyzerError::ModelLoad(format!(
                    "grip autoencoder {}: {err}",
                    model_path.display()
                ))
            })?;

        log::info!("grip autoencoder ready from {}", model_path.display());
        Ok(Self { session })
    }
}

impl InferenceEngine for GripAutoencoder {
    fn reconstruct(&mut self, input: &FeatureVector) -> Result<FeatureVector, AnalyzerError> {
        let array = Array2::from_shape_vec((1, FEATURE_LEN), input.to_vec())
            .map_err(|err| AnalyzerError::Inference(format!("input shape: {err}")))?;
        let tensor = Tensor::from_array(array)
            .map_err(|err| AnalyzerError::Inference(format!("input tensor: {err}")))?;

        let outputs = self
            .session
            .run(ort::inputs!["keypoints" => tensor])
            .map_err(|err| AnalyzerError::Inference(err.to_string()))?;
        let reconstructed = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|err| AnalyzerError::Inference(format!("output tensor: {err}")))?;

        let values: Vec<f32> = reconstructed.iter().copied().collect();
        let output: FeatureVector = values.as_slice().try_into().map_err(|_| {
            AnalyzerError::Inference(format!(
                "unexpected output length: got {}, need {FEATURE_LEN}",
                values.len()
            ))
        })?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_meta_parses_training_export() {
        let raw = r#"{
            "arch": [63, 32, 16, 32, 63],
            "threshold_train95": 0.00729,
            "coverage_val": 0.94,
            "coverage_test": 0.93,
            "seed": 42,
            "epochs": 200,
            "batch_size": 32,
            "lr": 0.001
        }"#;
        let meta: ModelMeta = serde_json::from_str(raw).unwrap();
        assert_eq!(meta.arch, vec![63, 32, 16, 32, 63]);
        assert!((meta.threshold_train95 - 0.00729).abs() < 1e-12);
        assert_eq!(meta.epochs, 200);
    }

    #[test]
    fn test_model_meta_tolerates_missing_optional_fields() {
        let raw = r#"{ "arch": [63, 16, 63], "threshold_train95": 0.004 }"#;
        let meta: ModelMeta = serde_json::from_str(raw).unwrap();
        assert_eq!(meta.seed, 0);
        assert_eq!(meta.batch_size, 0);
    }

    #[test]
    fn test_missing_meta_file_is_model_load_error() {
        let err = load_model_meta(Path::new("does/not/exist.json")).unwrap_err();
        assert!(matches!(err, AnalyzerError::ModelLoad(_)));
    }
}
