//! Detection results and the mock detector

use camera_capture::{ImageBuffer, PixelFormat};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{DetectError, Detector};

/// Box corners in cropped-image pixels. Corners may arrive in either order
/// and may lie outside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Swap corners so that `x1 <= x2` and `y1 <= y2`. No clamping.
    pub fn normalized(self) -> Self {
        Self {
            x1: self.x1.min(self.x2),
            y1: self.y1.min(self.y2),
            x2: self.x1.max(self.x2),
            y2: self.y1.max(self.y2),
        }
    }
}

/// One detector output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Model class index
    pub class_id: u32,

    /// Confidence in 0.0..=1.0
    pub score: f32,

    pub bbox: BoundingBox,
}

impl DetectionResult {
    pub fn new(class_id: u32, score: f32, bbox: BoundingBox) -> Self {
        Self {
            class_id,
            score,
            bbox,
        }
    }
}

/// Detector that replays a fixed result list
pub struct MockDetector {
    results: Vec<DetectionResult>,
    calls: u64,
}

impl MockDetector {
    pub fn new(results: Vec<DetectionResult>) -> Self {
        warn!("No detector model available. Using mock implementation.");
        Self { results, calls: 0 }
    }

    /// Number of `run` calls so far
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Detector for MockDetector {
    fn run(&mut self, image: &ImageBuffer) -> Result<Vec<DetectionResult>, DetectError> {
        if image.format() != PixelFormat::Rgb888 {
            return Err(DetectError::InvalidFrame(format!(
                "expected RGB888, got {}",
                image.format()
            )));
        }
        self.calls += 1;
        Ok(self.results.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_swaps_x() {
        let bbox = BoundingBox::new(50, 10, 10, 50).normalized();
        assert_eq!(bbox, BoundingBox::new(10, 10, 50, 50));
    }

    #[test]
    fn test_normalize_keeps_out_of_range() {
        let bbox = BoundingBox::new(300, -4, -20, 260).normalized();
        assert_eq!(bbox, BoundingBox::new(-20, -4, 300, 260));
    }

    #[test]
    fn test_mock_detector_replays() {
        let expected = vec![DetectionResult::new(0, 0.8, BoundingBox::new(1, 2, 3, 4))];
        let mut detector = MockDetector::new(expected.clone());
        let image = ImageBuffer::zeroed(8, 8, PixelFormat::Rgb888).unwrap();

        assert_eq!(detector.run(&image).unwrap(), expected);
        assert_eq!(detector.run(&image).unwrap(), expected);
        assert_eq!(detector.calls(), 2);
    }

    #[test]
    fn test_mock_detector_rejects_rgb565() {
        let mut detector = MockDetector::new(vec![]);
        let image = ImageBuffer::zeroed(8, 8, PixelFormat::Rgb565).unwrap();
        assert!(matches!(detector.run(&image), Err(DetectError::InvalidFrame(_))));
    }
}
