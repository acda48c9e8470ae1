#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod scheduler;

#[cfg(feature = "camera-nokhwa")]
pub use camera::{CameraDevice, CaptureStream, available_cameras, start_capture};
pub use scheduler::{FrameScheduler, SchedulerHandle, TickOutcome, start_scheduler};
