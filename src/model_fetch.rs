use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

use crate::{config::AnalyzerConfig, error::AnalyzerError};

const HAND_LANDMARKER_FILENAME: &str = "handpose_estimation_mediapipe_2023feb.onnx";
const HAND_LANDMARKER_URL: &str = "https://github.com/opencv/opencv_zoo/raw/main/models/handpose_estimation_mediapipe/handpose_estimation_mediapipe_2023feb.onnx";
const AUTOENCODER_FILENAME: &str = "grip_autoencoder.onnx";
const AUTOENCODER_META_FILENAME: &str = "model_meta.json";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    HandLandmarker,
    GripAutoencoder,
    AutoencoderMeta,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::HandLandmarker,
        ModelKind::GripAutoencoder,
        ModelKind::AutoencoderMeta,
    ];

    fn filename(&self) -> &'static str {
        match self {
            ModelKind::HandLandmarker => HAND_LANDMARKER_FILENAME,
            ModelKind::GripAutoencoder => AUTOENCODER_FILENAME,
            ModelKind::AutoencoderMeta => AUTOENCODER_META_FILENAME,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ModelKind::HandLandmarker => "hand landmark model",
            ModelKind::GripAutoencoder => "grip autoencoder model",
            ModelKind::AutoencoderMeta => "autoencoder metadata",
        }
    }

    pub fn path_in(&self, model_dir: &Path) -> PathBuf {
        model_dir.join(self.filename())
    }

    /// Where this artifact can be fetched from. The hand landmarker is a
    /// public model; the autoencoder and its metadata are served by the
    /// backend that trained them.
    fn source_url(&self, api_base_url: Option<&str>) -> Option<String> {
        match self {
            ModelKind::HandLandmarker => Some(HAND_LANDMARKER_URL.to_string()),
            ModelKind::GripAutoencoder | ModelKind::AutoencoderMeta => {
                api_base_url.map(|base| format!("{base}/models/{}", self.filename()))
            }
        }
    }
}

/// Make sure every model artifact exists locally, downloading any that are
/// missing. Missing artifacts with no reachable source are fatal for
/// starting analysis.
pub fn ensure_models_ready(config: &AnalyzerConfig) -> Result<(), AnalyzerError> {
    fs::create_dir_all(&config.model_dir).map_err(|err| {
        AnalyzerError::ModelLoad(format!(
            "failed to create model directory {}: {err}",
            config.model_dir.display()
        ))
    })?;

    for kind in ModelKind::ALL {
        let dest = kind.path_in(&config.model_dir);
        if dest.exists() {
            log::debug!("{} already present at {}", kind.label(), dest.display());
            continue;
        }

        let url = kind
            .source_url(config.api_base_url.as_deref())
            .ok_or_else(|| {
                AnalyzerError::ModelLoad(format!(
                    "{} missing at {} and no backend configured to fetch it from",
                    kind.label(),
                    dest.display()
                ))
            })?;

        download_to_path(kind.label(), &url, &dest)
            .map_err(|err| AnalyzerError::ModelLoad(format!("{}: {err:#}", kind.label())))?;
    }

    Ok(())
}

fn download_to_path(label: &str, url: &str, dest: &Path) -> Result<()> {
    log::info!("downloading {label} from {url} to {}", dest.display());

    let client = Client::new();
    let mut response = client
        .get(url)
        .send()
        .context("failed to start download")?
        .error_for_status()
        .context("download returned error status")?;

    let progress = create_progress_bar(response.content_length());

    let tmp_path = dest.with_extension("download");
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 16 * 1024];
    loop {
        let bytes_read = response
            .read(&mut buffer)
            .context("failed while reading download")?;
        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .context("failed while writing to disk")?;
        downloaded += bytes_read as u64;
        progress.set_position(downloaded);
    }

    file.sync_all().context("failed to flush download to disk")?;
    fs::rename(&tmp_path, dest).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            tmp_path.display(),
            dest.display()
        )
    })?;

    progress.finish_with_message(format!("{label} ready"));
    Ok(())
}

fn create_progress_bar(total_size: Option<u64>) -> ProgressBar {
    match total_size {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            ) {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.green} downloading {msg}") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_live_under_model_dir() {
        let dir = Path::new("models");
        assert_eq!(
            ModelKind::GripAutoencoder.path_in(dir),
            PathBuf::from("models/grip_autoencoder.onnx")
        );
        assert_eq!(
            ModelKind::AutoencoderMeta.path_in(dir),
            PathBuf::from("models/model_meta.json")
        );
    }

    #[test]
    fn test_autoencoder_source_requires_backend() {
        assert!(ModelKind::GripAutoencoder.source_url(None).is_none());
        assert_eq!(
            ModelKind::GripAutoencoder
                .source_url(Some("http://localhost:8000"))
                .as_deref(),
            Some("http://localhost:8000/models/grip_autoencoder.onnx")
        );
    }

    #[test]
    fn test_hand_landmarker_always_fetchable() {
        assert!(ModelKind::HandLandmarker.source_url(None).is_some());
    }
}
