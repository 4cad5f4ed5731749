//! Pipeline configuration
//!
//! Built once at startup from an optional TOML file layered under
//! `BUMBLEBEE_`-prefixed environment variables, e.g.
//! `BUMBLEBEE_DETECTION__SCORE_THRESHOLD=0.5`.

use camera_capture::CameraConfig;
use detection::DetectionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use storage::{JpegConfig, StorageConfig};

use crate::PipelineError;

/// Config file read when none is given on the command line
pub const DEFAULT_CONFIG_PATH: &str = "config/bumblebee.toml";

/// What the binary does after startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Capture, detect, annotate and archive forever
    Capture,
    /// Run the detector once on the configured still image
    Still,
}

/// Loop timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Wait after a failed cycle
    pub backoff_ms: u64,
    /// Wait after a completed cycle
    pub cycle_delay_ms: u64,
    pub mode: RunMode,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            backoff_ms: 2000,
            cycle_delay_ms: 2000,
            mode: RunMode::Capture,
        }
    }
}

impl AcquisitionConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub camera: CameraConfig,
    pub detection: DetectionConfig,
    pub storage: StorageConfig,
    pub encoder: JpegConfig,
    pub acquisition: AcquisitionConfig,
}

impl PipelineConfig {
    /// Load from `path` (or the default file, if present) plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));

        let settings = ::config::Config::builder()
            .add_source(::config::File::from(file).required(path.is_some()))
            .add_source(
                ::config::Environment::with_prefix("BUMBLEBEE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.camera.validate()?;

        let det = &self.detection;
        if det.crop_size == 0 {
            return Err(PipelineError::Config("crop_size must be non-zero".to_string()));
        }
        if det.crop_size > self.camera.frame_width || det.crop_size > self.camera.frame_height {
            return Err(PipelineError::Config(format!(
                "crop_size {} exceeds frame {}x{}",
                det.crop_size, self.camera.frame_width, self.camera.frame_height
            )));
        }
        for (name, value) in [
            ("score_threshold", det.score_threshold),
            ("still_score_threshold", det.still_score_threshold),
            ("detector_score_threshold", det.detector_score_threshold),
            ("nms_threshold", det.nms_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PipelineError::Config(format!("{} {} outside [0, 1]", name, value)));
            }
        }
        if det.stroke_width == 0 {
            return Err(PipelineError::Config("stroke_width must be non-zero".to_string()));
        }

        if !(1..=100).contains(&self.encoder.quality) {
            return Err(PipelineError::Config(format!(
                "encoder quality {} outside 1..=100",
                self.encoder.quality
            )));
        }
        if self.encoder.scratch_capacity == 0 {
            return Err(PipelineError::Config("scratch_capacity must be non-zero".to_string()));
        }
        Ok(())
    }
}
