//! One-shot detection on a still image
//!
//! Feeds a JPEG from disk through the same convert and crop path as the live
//! camera and reports what the detector finds. Nothing is drawn or archived.

use camera_capture::{center_crop, rgb565_to_rgb888, FrameSource, RawFrame, StillImageSource};
use detection::{DetectionConfig, DetectionResult, Detector};
use std::path::Path;
use tracing::info;

use crate::PipelineError;

/// Detections in the center crop of `path` that pass the still-image filter
pub fn detect_still<D: Detector + ?Sized>(
    path: &Path,
    detector: &mut D,
    config: &DetectionConfig,
) -> Result<Vec<DetectionResult>, PipelineError> {
    let mut source = StillImageSource::open(path)?;
    let raw = source.acquire_frame()?.to_owned_image()?;
    let converted = rgb565_to_rgb888(&raw)?;
    let cropped = center_crop(&converted, config.crop_size)?;

    let results = detector.run(&cropped)?;
    let filter = config.still_filter();
    let selected: Vec<DetectionResult> = filter.select(&results).cloned().collect();
    for result in &selected {
        info!(
            "[category: {}, score: {:.3}, x1: {}, y1: {}, x2: {}, y2: {}]",
            result.class_id,
            result.score,
            result.bbox.x1,
            result.bbox.y1,
            result.bbox.x2,
            result.bbox.y2
        );
    }
    Ok(selected)
}
