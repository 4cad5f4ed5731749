//! Detection configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::object::DetectionResult;
use crate::overlay::{DetectionFilter, OverlayStyle};

/// Where the detector loads its model from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelLocation {
    /// Model blob linked into the firmware image
    FlashRodata,
    /// Model stored in a dedicated flash partition
    FlashPartition,
    /// Model file on the SD card
    SdCard,
}

/// Detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Square model input size; frames are center-cropped to this
    pub crop_size: u32,

    /// Class drawn on archived images
    pub target_class: u32,

    /// Score threshold for the capture/overlay path
    pub score_threshold: f32,

    /// Score threshold for the static-image path
    pub still_score_threshold: f32,

    /// Score cutoff applied inside the detector, below both filters
    pub detector_score_threshold: f32,

    /// NMS IoU threshold handed to the detector
    pub nms_threshold: f32,

    pub model_location: ModelLocation,
    pub model_name: String,
    /// Directory under the SD mount point holding model files
    pub model_sdcard_dir: String,
    /// Flash partition label for `FlashPartition`
    pub model_partition: String,

    pub stroke_width: u32,
    pub box_color: [u8; 3],

    /// Results replayed by the mock detector
    pub mock_results: Vec<DetectionResult>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            crop_size: 224,
            target_class: 0,
            score_threshold: 0.35,
            still_score_threshold: 0.30,
            detector_score_threshold: 0.3,
            nms_threshold: 0.7,
            model_location: ModelLocation::FlashRodata,
            model_name: "espdet_pico_224_224_bumblebee.espdl".to_string(),
            model_sdcard_dir: "models".to_string(),
            model_partition: "bumblebee_det".to_string(),
            stroke_width: 2,
            box_color: [255, 0, 0],
            mock_results: Vec::new(),
        }
    }
}

impl DetectionConfig {
    /// Filter used before drawing overlays
    pub fn overlay_filter(&self) -> DetectionFilter {
        DetectionFilter {
            target_class: self.target_class,
            threshold: self.score_threshold,
        }
    }

    /// Filter used on the static-image path
    pub fn still_filter(&self) -> DetectionFilter {
        DetectionFilter {
            target_class: self.target_class,
            threshold: self.still_score_threshold,
        }
    }

    pub fn overlay_style(&self) -> OverlayStyle {
        OverlayStyle {
            color: self.box_color,
            stroke_width: self.stroke_width,
        }
    }

    /// Model path as the detector expects it for the configured location
    pub fn model_path(&self, sd_mount_point: &Path) -> PathBuf {
        match self.model_location {
            ModelLocation::FlashRodata => PathBuf::from(&self.model_name),
            ModelLocation::FlashPartition => PathBuf::from(&self.model_partition),
            ModelLocation::SdCard => sd_mount_point
                .join(&self.model_sdcard_dir)
                .join(&self.model_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let config = DetectionConfig::default();
        assert_eq!(config.overlay_filter().threshold, 0.35);
        assert_eq!(config.still_filter().threshold, 0.30);
        assert_eq!(config.overlay_style(), OverlayStyle::default());
    }

    #[test]
    fn test_detector_cutoff_independent_of_still_filter() {
        let config = DetectionConfig {
            still_score_threshold: 0.5,
            ..Default::default()
        };
        assert_eq!(config.detector_score_threshold, 0.3);
        assert_eq!(config.still_filter().threshold, 0.5);
        assert_eq!(config.overlay_filter().threshold, 0.35);
    }

    #[test]
    fn test_sd_model_path() {
        let config = DetectionConfig {
            model_location: ModelLocation::SdCard,
            ..Default::default()
        };
        assert_eq!(
            config.model_path(Path::new("/sdcard")),
            PathBuf::from("/sdcard/models/espdet_pico_224_224_bumblebee.espdl")
        );
    }

    #[test]
    fn test_partition_model_path() {
        let config = DetectionConfig {
            model_location: ModelLocation::FlashPartition,
            ..Default::default()
        };
        assert_eq!(config.model_path(Path::new("/sdcard")), PathBuf::from("bumblebee_det"));
    }
}
