//! Acquisition loop
//!
//! One cycle grabs a frame, copies it out of the driver, converts and crops
//! it, runs the detector, draws the selected boxes and archives the result.
//! Every buffer a cycle allocates is dropped before the cycle's delay starts.

use camera_capture::{center_crop, rgb565_to_rgb888, FrameSource, RawFrame};
use detection::{annotate, DetectionFilter, Detector, OverlayStyle};
use std::path::PathBuf;
use storage::{Mounter, StorageManager};
use tracing::{debug, info, warn};

use crate::settings::{AcquisitionConfig, PipelineConfig};
use crate::PipelineError;

/// Outcome of a completed cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// 1-based cycle number, counting failed cycles too
    pub cycle: u64,
    /// Detections that passed the filter and were drawn
    pub selected: usize,
    /// Archive file written
    pub saved: PathBuf,
}

/// The capture → detect → archive loop
pub struct AcquisitionLoop<'a, C, D, M>
where
    C: FrameSource,
    D: Detector + ?Sized,
    M: Mounter,
{
    camera: C,
    detector: &'a mut D,
    storage: &'a mut StorageManager<M>,
    crop_size: u32,
    filter: DetectionFilter,
    style: OverlayStyle,
    timing: AcquisitionConfig,
    cycles: u64,
}

impl<'a, C, D, M> AcquisitionLoop<'a, C, D, M>
where
    C: FrameSource,
    D: Detector + ?Sized,
    M: Mounter,
{
    pub fn new(
        camera: C,
        detector: &'a mut D,
        storage: &'a mut StorageManager<M>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            camera,
            detector,
            storage,
            crop_size: config.detection.crop_size,
            filter: config.detection.overlay_filter(),
            style: config.detection.overlay_style(),
            timing: config.acquisition.clone(),
            cycles: 0,
        }
    }

    /// Cycles attempted so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run one cycle without waiting afterwards
    pub fn run_cycle(&mut self) -> Result<CycleReport, PipelineError> {
        self.cycles += 1;
        let cycle = self.cycles;
        debug!("Cycle {} start", cycle);

        // The driver buffer goes back as soon as the bytes are copied,
        // whether or not the copy succeeded.
        let raw = {
            let frame = self.camera.acquire_frame()?;
            debug!(
                "Frame {}x{} {} ({} bytes)",
                frame.width(),
                frame.height(),
                frame.format(),
                frame.data().len()
            );
            let owned = frame.to_owned_image();
            drop(frame);
            owned?
        };

        let converted = rgb565_to_rgb888(&raw)?;
        drop(raw);
        let mut cropped = center_crop(&converted, self.crop_size)?;
        drop(converted);

        let results = self.detector.run(&cropped)?;
        let selected = annotate(&mut cropped, &results, &self.filter, &self.style)?;
        if selected == 0 {
            info!(
                "Detection done, nothing detected (class {} & score > {:.2})",
                self.filter.target_class, self.filter.threshold
            );
        } else {
            info!("Detection done, results: {}", selected);
        }

        let saved = self.storage.save_to_archive(&cropped)?;
        Ok(CycleReport {
            cycle,
            selected,
            saved,
        })
    }

    /// Run one cycle, then wait the inter-cycle delay or the failure backoff
    pub async fn step(&mut self) -> Result<CycleReport, PipelineError> {
        let result = self.run_cycle();
        let wait = match &result {
            Ok(report) => {
                debug!("Cycle {} archived {}", report.cycle, report.saved.display());
                self.timing.cycle_delay()
            }
            Err(e) => {
                warn!(
                    "Cycle {} failed ({}): {}; retrying in {} ms",
                    self.cycles,
                    e.kind(),
                    e,
                    self.timing.backoff_ms
                );
                self.timing.backoff()
            }
        };
        tokio::time::sleep(wait).await;
        result
    }

    /// Cycle forever. Per-cycle failures never end the loop.
    pub async fn run(&mut self) {
        info!(
            "Acquisition loop started (crop {}, delay {} ms, backoff {} ms)",
            self.crop_size, self.timing.cycle_delay_ms, self.timing.backoff_ms
        );
        loop {
            let _ = self.step().await;
        }
    }
}
