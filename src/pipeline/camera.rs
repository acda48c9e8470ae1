use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use crossbeam_channel::Sender;
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType},
};
use rayon::prelude::*;

use crate::{error::AnalyzerError, types::Frame};

/// One selectable capture device.
#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: CameraIndex,
    pub label: String,
}

/// Exclusive owner of an open camera. The analysis core only reads frames
/// from the channel this feeds; dropping or stopping the stream releases the
/// device.
#[derive(Debug)]
pub struct CaptureStream {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CaptureStream {
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub fn available_cameras() -> Result<Vec<CameraDevice>, AnalyzerError> {
    let cameras =
        query(ApiBackend::Auto).map_err(|err| AnalyzerError::Capture(err.to_string()))?;
    Ok(cameras
        .into_iter()
        .map(|info| CameraDevice {
            index: info.index().clone(),
            label: info.human_name(),
        })
        .collect())
}

fn build_camera(index: CameraIndex) -> Result<Camera, AnalyzerError> {
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
    let mut camera =
        Camera::new(index, requested).map_err(|err| AnalyzerError::Capture(err.to_string()))?;
    camera
        .open_stream()
        .map_err(|err| AnalyzerError::Capture(err.to_string()))?;
    Ok(camera)
}

/// Open the camera and stream RGBA frames into `frame_tx`.
///
/// Opening fails fast with a `Capture` error so the caller can show a
/// device-specific remediation message before any thread is spawned. Frames
/// are `try_send`-dropped when the consumer is busy; per-frame read or
/// decode failures are logged and skipped.
pub fn start_capture(
    index: CameraIndex,
    frame_tx: Sender<Frame>,
) -> Result<CaptureStream, AnalyzerError> {
    build_camera(index.clone())?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = thread::spawn(move || {
        let mut camera = match build_camera(index) {
            Ok(camera) => camera,
            Err(err) => {
                log::error!("failed to reopen camera: {err}");
                return;
            }
        };

        while !stop_flag.load(Ordering::Relaxed) {
            let buffer = match camera.frame() {
                Ok(buffer) => buffer,
                Err(err) => {
                    log::warn!("camera frame read failed: {err:?}");
                    continue;
                }
            };

            let decoded = match buffer.decode_image::<RgbFormat>() {
                Ok(image) => image,
                Err(err) => {
                    log::warn!("failed to decode camera frame: {err:?}");
                    continue;
                }
            };

            let (width, height) = decoded.dimensions();
            let rgb = decoded.into_raw();
            if rgb.is_empty() {
                continue;
            }

            let _ = frame_tx.try_send(Frame {
                rgba: expand_rgb_to_rgba(&rgb),
                width,
                height,
                timestamp: Instant::now(),
            });
        }
    });

    Ok(CaptureStream {
        stop,
        handle: Some(handle),
    })
}

fn expand_rgb_to_rgba(rgb: &[u8]) -> Vec<u8> {
    let mut rgba = vec![255u8; rgb.len() / 3 * 4];
    rgba.par_chunks_mut(4)
        .zip(rgb.par_chunks_exact(3))
        .for_each(|(dst, src)| {
            dst[0] = src[0];
            dst[1] = src[1];
            dst[2] = src[2];
        });
    rgba
}
