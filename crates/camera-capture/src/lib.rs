//! Camera Capture Library for the bumblebee archive camera
//!
//! Provides frame acquisition and the pixel stages that run before detection:
//! - Camera collaborator seam ([`FrameSource`]) with RAII frame release
//! - RGB565 (big-endian) to RGB888 conversion
//! - Deterministic center crop to the detector input size
//! - Still-image frame source for running without sensor hardware

pub mod convert;
#[cfg(feature = "esp32")]
pub mod ffi;
pub mod frame;
pub mod source;

pub use convert::{center_crop, crop_origin, rgb565_to_rgb888};
pub use frame::{ImageBuffer, PixelFormat};
pub use source::{FrameSource, RawFrame, StillImageSource};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera init failed: {0}")]
    Init(String),

    #[error("Failed to capture frame")]
    Capture,

    #[error("Buffer allocation of {0} bytes failed")]
    Allocation(usize),

    #[error("Expected {expected} pixels, got {actual}")]
    Format {
        expected: PixelFormat,
        actual: PixelFormat,
    },

    #[error("Buffer size mismatch: {width}x{height} {format} needs {expected} bytes, got {actual}")]
    SizeMismatch {
        width: u32,
        height: u32,
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },

    #[error("Cannot crop {size}x{size} from {width}x{height}")]
    InvalidCrop { size: u32, width: u32, height: u32 },

    #[error("Unsupported driver frame format: {0}")]
    UnsupportedFormat(String),

    #[error("Still image error: {0}")]
    Still(String),
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Sensor output format; the pipeline only accepts RGB565
    pub pixel_format: PixelFormat,
    /// Capture width (QVGA)
    pub frame_width: u32,
    /// Capture height (QVGA)
    pub frame_height: u32,
    /// Sensor XCLK frequency
    pub xclk_freq_hz: u32,
    /// Driver frame buffer count
    pub fb_count: u32,
    /// Serve frames from this JPEG instead of the sensor
    pub still_image: Option<PathBuf>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Rgb565,
            frame_width: 320,
            frame_height: 240,
            xclk_freq_hz: 20_000_000,
            fb_count: 2,
            still_image: None,
        }
    }
}

impl CameraConfig {
    /// Reject formats the pipeline cannot convert
    pub fn validate(&self) -> Result<(), CameraError> {
        if self.pixel_format != PixelFormat::Rgb565 {
            return Err(CameraError::Init(format!(
                "unsupported sensor pixel format {}",
                self.pixel_format
            )));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(CameraError::Init("frame size must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_qvga_rgb565() {
        let config = CameraConfig::default();
        assert_eq!(config.pixel_format, PixelFormat::Rgb565);
        assert_eq!((config.frame_width, config.frame_height), (320, 240));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rgb888_sensor_rejected() {
        let config = CameraConfig {
            pixel_format: PixelFormat::Rgb888,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CameraError::Init(_))));
    }
}
