//! FFI bindings for the ESPDet model shim

use libc::{c_char, c_int, c_void, size_t};
use std::ffi::CString;
use std::path::Path;
use std::ptr::NonNull;
use tracing::{error, info};

use camera_capture::{ImageBuffer, PixelFormat};

use crate::object::{BoundingBox, DetectionResult};
use crate::{DetectError, DetectionConfig, Detector, ModelLocation};

/// Upper bound on boxes returned per call (matches the postprocessor's top-k)
const MAX_DETECTIONS: usize = 10;

/// C detection record
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CDetection {
    pub category: c_int,
    pub score: f32,
    pub box_: [c_int; 4],
}

extern "C" {
    fn espdet_create(
        model_path: *const c_char,
        location: c_int,
        score_thr: f32,
        nms_thr: f32,
    ) -> *mut c_void;
    fn espdet_run(
        handle: *mut c_void,
        rgb888: *const u8,
        width: c_int,
        height: c_int,
        out: *mut CDetection,
        capacity: size_t,
    ) -> c_int;
    fn espdet_destroy(handle: *mut c_void);
}

/// ESPDet detector handle, loaded once and reused
pub struct EspDetDetector {
    handle: NonNull<c_void>,
}

impl EspDetDetector {
    /// Load the model from the configured location
    pub fn new(config: &DetectionConfig, sd_mount_point: &Path) -> Result<Self, DetectError> {
        let path = config.model_path(sd_mount_point);
        let c_path = CString::new(path.to_string_lossy().as_bytes())
            .map_err(|e| DetectError::ModelLoad(e.to_string()))?;
        let location = match config.model_location {
            ModelLocation::FlashRodata => 0,
            ModelLocation::FlashPartition => 1,
            ModelLocation::SdCard => 2,
        };

        info!("Loading detector model {} ({:?})", path.display(), config.model_location);
        let raw = unsafe {
            espdet_create(
                c_path.as_ptr(),
                location,
                config.detector_score_threshold,
                config.nms_threshold,
            )
        };
        let handle = NonNull::new(raw).ok_or_else(|| {
            error!("Failed to load detector model {}", path.display());
            DetectError::ModelLoad(path.display().to_string())
        })?;

        Ok(Self { handle })
    }
}

impl Detector for EspDetDetector {
    fn run(&mut self, image: &ImageBuffer) -> Result<Vec<DetectionResult>, DetectError> {
        if image.format() != PixelFormat::Rgb888 {
            return Err(DetectError::InvalidFrame(format!(
                "expected RGB888, got {}",
                image.format()
            )));
        }

        let mut out = [CDetection::default(); MAX_DETECTIONS];
        let count = unsafe {
            espdet_run(
                self.handle.as_ptr(),
                image.data().as_ptr(),
                image.width() as c_int,
                image.height() as c_int,
                out.as_mut_ptr(),
                out.len(),
            )
        };
        if count < 0 {
            return Err(DetectError::Inference(format!("espdet_run returned {}", count)));
        }

        Ok(out[..(count as usize).min(MAX_DETECTIONS)]
            .iter()
            .map(|d| DetectionResult {
                class_id: d.category.max(0) as u32,
                score: d.score,
                bbox: BoundingBox::new(d.box_[0], d.box_[1], d.box_[2], d.box_[3]),
            })
            .collect())
    }
}

impl Drop for EspDetDetector {
    fn drop(&mut self) {
        unsafe { espdet_destroy(self.handle.as_ptr()) };
    }
}
