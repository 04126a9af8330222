use chrono::Utc;
use flash_shield_common::config::CaptureConfig;
use flash_shield_common::frame::{ChannelOrder, Frame, FrameError};
use image::imageops::FilterType;
use tracing::info;
use xcap::Monitor;

/// Source of screen frames.
///
/// `grab` may fail transiently (capture device busy, display
/// reconfiguration); callers skip the tick and retry.
pub trait FrameSource {
    fn grab(&mut self) -> Result<Frame, CaptureError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to enumerate monitors: {0}")]
    Enumerate(String),
    #[error("no monitors found")]
    NoMonitor,
    #[error("monitor index {index} out of range ({available} available)")]
    MonitorIndex { index: usize, available: usize },
    #[error("screen capture failed: {0}")]
    Capture(String),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Captures one monitor through the OS screenshot API and downscales to the
/// analysis resolution. Downscaling keeps the per-tick cost flat no matter
/// how large the display is.
pub struct MonitorSource {
    monitor: Monitor,
    target_width: u32,
    target_height: u32,
}

impl MonitorSource {
    pub fn new(config: &CaptureConfig) -> Result<Self, CaptureError> {
        let monitors = Monitor::all().map_err(|e| CaptureError::Enumerate(e.to_string()))?;
        if monitors.is_empty() {
            return Err(CaptureError::NoMonitor);
        }
        let monitor = monitors
            .get(config.monitor_index)
            .cloned()
            .ok_or(CaptureError::MonitorIndex {
                index: config.monitor_index,
                available: monitors.len(),
            })?;

        info!(
            monitor = monitor.name(),
            width = monitor.width(),
            height = monitor.height(),
            target_width = config.target_width,
            target_height = config.target_height,
            "capture source ready"
        );

        Ok(Self {
            monitor,
            target_width: config.target_width,
            target_height: config.target_height,
        })
    }
}

impl FrameSource for MonitorSource {
    fn grab(&mut self) -> Result<Frame, CaptureError> {
        let image = self
            .monitor
            .capture_image()
            .map_err(|e| CaptureError::Capture(e.to_string()))?;
        let captured_at_ms = Utc::now().timestamp_millis();

        let rgb = image::DynamicImage::ImageRgba8(image)
            .resize_exact(self.target_width, self.target_height, FilterType::Nearest)
            .to_rgb8();
        let (width, height) = rgb.dimensions();

        Ok(Frame::from_raw(
            rgb.into_raw(),
            width,
            height,
            ChannelOrder::Rgb,
            captured_at_ms,
        )?)
    }
}
