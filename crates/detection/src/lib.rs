//! Bumblebee Detection
//!
//! Thin layer around the external object detector:
//! - Detector seam ([`Detector`]) constructed once and reused every cycle
//! - Detection results in cropped-image pixel coordinates
//! - Class/score filtering and hollow bounding box overlay

pub mod config;
#[cfg(feature = "esp32")]
pub mod ffi;
pub mod object;
pub mod overlay;

pub use config::{DetectionConfig, ModelLocation};
pub use object::{BoundingBox, DetectionResult, MockDetector};
pub use overlay::{annotate, DetectionFilter, OverlayStyle};

use camera_capture::ImageBuffer;
use thiserror::Error;

/// Detection error types
#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

/// External object detector.
///
/// Implementations own whatever model state they need; from the pipeline's
/// side every call is independent.
pub trait Detector {
    /// Run the model on an RGB888 image of the model input size
    fn run(&mut self, image: &ImageBuffer) -> Result<Vec<DetectionResult>, DetectError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn run(&mut self, image: &ImageBuffer) -> Result<Vec<DetectionResult>, DetectError> {
        (**self).run(image)
    }
}
