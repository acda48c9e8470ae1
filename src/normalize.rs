use crate::types::{FEATURE_LEN, FeatureVector, HandPose};

/// Convert 21 detected landmarks into the autoencoder input layout.
///
/// Every landmark is translated so the wrist sits at the origin, then the
/// coordinates are flattened in landmark order (x, y, z per landmark). The
/// wrist's own entry is therefore exactly `[0, 0, 0]`, and translating the
/// whole hand leaves the output unchanged.
pub fn normalize_keypoints(pose: &HandPose) -> FeatureVector {
    let wrist = pose.wrist();
    let mut features = [0.0f32; FEATURE_LEN];

    for (i, landmark) in pose.landmarks().iter().enumerate() {
        features[i * 3] = landmark.x - wrist.x;
        features[i * 3 + 1] = landmark.y - wrist.y;
        features[i * 3 + 2] = landmark.z - wrist.z;
    }

    features
}
