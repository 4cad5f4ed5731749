//! Detection filtering and bounding box overlay

use camera_capture::{ImageBuffer, PixelFormat};
use image::Rgb;
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::object::{BoundingBox, DetectionResult};
use crate::DetectError;

/// Borrowed RGB888 view used as a drawing canvas
type RgbCanvas<'a> = image::ImageBuffer<Rgb<u8>, &'a mut [u8]>;

/// Which detections get drawn
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionFilter {
    pub target_class: u32,
    /// Scores must be strictly greater than this
    pub threshold: f32,
}

impl DetectionFilter {
    pub fn accepts(&self, result: &DetectionResult) -> bool {
        result.class_id == self.target_class && result.score > self.threshold
    }

    /// Selected results, in detector order
    pub fn select<'a>(
        &'a self,
        results: &'a [DetectionResult],
    ) -> impl Iterator<Item = &'a DetectionResult> + 'a {
        results.iter().filter(move |r| self.accepts(r))
    }
}

/// Outline appearance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayStyle {
    pub color: [u8; 3],
    /// Outline thickness in pixels, growing inwards from the box edge
    pub stroke_width: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            color: [255, 0, 0],
            stroke_width: 2,
        }
    }
}

/// Draw an outline for every selected detection onto `image`.
///
/// Returns how many detections were selected. Pixels falling outside the image
/// are skipped; the box itself is never clamped.
pub fn annotate(
    image: &mut ImageBuffer,
    results: &[DetectionResult],
    filter: &DetectionFilter,
    style: &OverlayStyle,
) -> Result<usize, DetectError> {
    if image.format() != PixelFormat::Rgb888 {
        return Err(DetectError::InvalidFrame(format!(
            "overlay needs RGB888, got {}",
            image.format()
        )));
    }

    let (width, height) = (image.width(), image.height());
    let mut canvas = RgbCanvas::from_raw(width, height, image.data_mut())
        .ok_or_else(|| DetectError::InvalidFrame("buffer smaller than image".to_string()))?;

    let mut selected = 0;
    for result in filter.select(results) {
        info!(
            "[class: {}, score: {:.3}, x1: {}, y1: {}, x2: {}, y2: {}]",
            result.class_id,
            result.score,
            result.bbox.x1,
            result.bbox.y1,
            result.bbox.x2,
            result.bbox.y2
        );
        draw_box(&mut canvas, result.bbox.normalized(), style);
        selected += 1;
    }
    Ok(selected)
}

fn draw_box(canvas: &mut RgbCanvas<'_>, bbox: BoundingBox, style: &OverlayStyle) {
    let color = Rgb(style.color);

    for t in 0..style.stroke_width as i64 {
        let left = bbox.x1 as i64 + t;
        let top = bbox.y1 as i64 + t;
        let right = bbox.x2 as i64 - t;
        let bottom = bbox.y2 as i64 - t;
        if left > right || top > bottom {
            break;
        }
        fill_clipped(canvas, (left, top), (right, top), color);
        fill_clipped(canvas, (left, bottom), (right, bottom), color);
        fill_clipped(canvas, (left, top), (left, bottom), color);
        fill_clipped(canvas, (right, top), (right, bottom), color);
    }
}

/// Fill the inclusive span `from..=to`, dropping whatever lies off the canvas
fn fill_clipped(canvas: &mut RgbCanvas<'_>, from: (i64, i64), to: (i64, i64), color: Rgb<u8>) {
    let (width, height) = canvas.dimensions();
    let x0 = from.0.max(0);
    let y0 = from.1.max(0);
    let x1 = to.0.min(width as i64 - 1);
    let y1 = to.1.min(height as i64 - 1);
    if x0 > x1 || y0 > y1 {
        return;
    }
    // all four values are now inside the canvas
    let rect = Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32);
    draw_filled_rect_mut(canvas, rect, color);
}
