use std::path::Path;

use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::Tensor,
};
use rayon::prelude::*;

use crate::{
    error::AnalyzerError,
    types::{Frame, HandPose, Landmark, NUM_LANDMARKS},
};

/// Square input side of the hand-landmark model.
pub const DETECTOR_INPUT_SIZE: u32 = 224;

/// Hand-pose detection contract consumed by the scheduler.
///
/// Returns at most one ordered 21-landmark pose in unit-range frame
/// coordinates, or `None` when no hand is present. A returned error is
/// treated by callers exactly like a miss.
pub trait PoseDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        timestamp_ms: u64,
    ) -> Result<Option<HandPose>, AnalyzerError>;
}

/// ONNX hand-landmark detector.
pub struct OrtPoseDetector {
    session: Session,
    min_confidence: f32,
}

impl OrtPoseDetector {
    pub fn load(model_path: &Path, min_confidence: f32) -> Result<Self, AnalyzerError> {
        let session = Session::builder()
            .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|builder| builder.with_intra_threads(2))
            .and_then(|builder| builder.commit_from_file(model_path))
            .map_err(|err| {
                AnalyzerError::ModelLoad(format!(
                    "hand landmark model {}: {err}",
                    model_path.display()
                ))
            })?;

        log::info!("hand landmark model ready from {}", model_path.display());
        Ok(Self {
            session,
            min_confidence,
        })
    }
}

impl PoseDetector for OrtPoseDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        _timestamp_ms: u64,
    ) -> Result<Option<HandPose>, AnalyzerError> {
        let (input, letterbox) = letterbox_frame(frame, DETECTOR_INPUT_SIZE)
            .map_err(|err| AnalyzerError::Detection(format!("frame preparation: {err}")))?;

        let tensor = Tensor::from_array(input)
            .map_err(|err| AnalyzerError::Detection(format!("input tensor: {err}")))?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|err| AnalyzerError::Detection(err.to_string()))?;
        if outputs.len() < 2 {
            return Err(AnalyzerError::Detection(
                "model returned too few outputs".into(),
            ));
        }

        let presence = outputs[1]
            .try_extract_array::<f32>()
            .ok()
            .and_then(|scores| scores.iter().next().copied())
            .unwrap_or(0.0);
        if presence < self.min_confidence {
            return Ok(None);
        }

        let coords = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|err| AnalyzerError::Detection(format!("landmark output: {err}")))?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let pose = decode_landmarks(&flattened, &letterbox)
            .map_err(|err| AnalyzerError::Detection(err.to_string()))?;

        Ok(Some(pose))
    }
}

#[derive(Clone, Debug)]
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    orig_w: u32,
    orig_h: u32,
}

/// Letterbox an RGBA frame into a `(1, S, S, 3)` float tensor, keeping
/// aspect ratio and padding with black.
fn letterbox_frame(frame: &Frame, target_size: u32) -> Result<(Array4<f32>, LetterboxInfo)> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = (frame.width as f32 * scale).round().max(1.0) as u32;
    let new_h = (frame.height as f32 * scale).round().max(1.0) as u32;

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let pad_x = ((target_size as i64 - new_w as i64) / 2).max(0) as usize;
    let pad_y = ((target_size as i64 - new_h as i64) / 2).max(0) as usize;
    let side = target_size as usize;
    let mut canvas = vec![0u8; side * side * 4];
    let dst_stride = side * 4;
    let src_stride = new_w as usize * 4;
    for row in 0..(new_h as usize) {
        let dst_offset = (pad_y + row) * dst_stride + pad_x * 4;
        canvas[dst_offset..dst_offset + src_stride]
            .copy_from_slice(&resized[row * src_stride..(row + 1) * src_stride]);
    }

    let normalized: Vec<f32> = canvas
        .par_chunks_exact(4)
        .flat_map_iter(|px| {
            [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ]
        })
        .collect();
    let input = Array4::<f32>::from_shape_vec((1, side, side, 3), normalized)
        .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    Ok((
        input,
        LetterboxInfo {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            orig_w: frame.width,
            orig_h: frame.height,
        },
    ))
}

/// Map the model's crop-space coordinates back to unit-range frame
/// coordinates, undoing the letterbox.
fn decode_landmarks(flat: &[f32], letterbox: &LetterboxInfo) -> Result<HandPose> {
    if flat.len() < NUM_LANDMARKS * 3 {
        return Err(anyhow!(
            "unexpected landmark count: got {}, need {}",
            flat.len() / 3,
            NUM_LANDMARKS
        ));
    }

    let width = letterbox.orig_w.max(1) as f32;
    let height = letterbox.orig_h.max(1) as f32;
    let mut landmarks = [Landmark::new(0.0, 0.0, 0.0); NUM_LANDMARKS];
    for (landmark, chunk) in landmarks.iter_mut().zip(flat.chunks_exact(3)) {
        let px = (chunk[0] - letterbox.pad_x) / letterbox.scale;
        let py = (chunk[1] - letterbox.pad_y) / letterbox.scale;
        // Depth shares the crop scale; it stays wrist-relative downstream.
        let z = chunk[2] / DETECTOR_INPUT_SIZE as f32;
        *landmark = Landmark::new(
            (px / width).clamp(0.0, 1.0),
            (py / height).clamp(0.0, 1.0),
            z,
        );
    }

    Ok(HandPose::new(landmarks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn solid_frame(width: u32, height: u32) -> Frame {
        Frame {
            rgba: vec![127u8; (width * height * 4) as usize],
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn test_letterbox_shape_and_padding() {
        let frame = solid_frame(640, 480);
        let (input, letterbox) = letterbox_frame(&frame, DETECTOR_INPUT_SIZE).unwrap();
        assert_eq!(input.shape(), &[1, 224, 224, 3]);
        assert_eq!(letterbox.pad_x, 0.0);
        assert!(letterbox.pad_y > 0.0);
        // Top padding rows stay black.
        assert_eq!(input[[0, 0, 0, 0]], 0.0);
    }

    #[test]
    fn test_letterbox_rejects_short_buffer() {
        let mut frame = solid_frame(64, 64);
        frame.rgba.truncate(16);
        assert!(letterbox_frame(&frame, DETECTOR_INPUT_SIZE).is_err());
    }

    #[test]
    fn test_decode_projects_to_unit_range() {
        let letterbox = LetterboxInfo {
            scale: 0.35,
            pad_x: 0.0,
            pad_y: 28.0,
            orig_w: 640,
            orig_h: 480,
        };
        // Landmark at the crop centre maps to the frame centre.
        let mut flat = vec![0.0f32; NUM_LANDMARKS * 3];
        flat[0] = 112.0;
        flat[1] = 112.0;
        let pose = decode_landmarks(&flat, &letterbox).unwrap();
        let wrist = pose.wrist();
        assert!((wrist.x - 0.5).abs() < 1e-3);
        assert!((wrist.y - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_decode_rejects_truncated_output() {
        let letterbox = LetterboxInfo {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            orig_w: 224,
            orig_h: 224,
        };
        let flat = vec![0.0f32; 30];
        assert!(decode_landmarks(&flat, &letterbox).is_err());
    }
}
