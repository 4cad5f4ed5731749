//! Bumblebee Capture Pipeline
//!
//! Wires the camera, detector and storage crates into the archive loop:
//! capture → RGB888 → center crop → detect → overlay → JPEG → SD card.

pub mod acquisition;
pub mod settings;
pub mod still;

pub use acquisition::{AcquisitionLoop, CycleReport};
pub use settings::{AcquisitionConfig, PipelineConfig, RunMode};
pub use still::detect_still;

use camera_capture::{CameraError, FrameSource, StillImageSource};
use detection::{DetectError, Detector};
use std::fmt;
use storage::{EncodeError, Mounter, StorageError, StorageManager};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[cfg(feature = "esp32")]
type BoardMounter = storage::ffi::SdSpiMounter;
#[cfg(not(feature = "esp32"))]
type BoardMounter = storage::DirectoryMounter;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Camera: {0}")]
    Camera(#[from] CameraError),
    #[error("Detection: {0}")]
    Detect(#[from] DetectError),
    #[error("Storage: {0}")]
    Storage(#[from] StorageError),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failure classes used for per-cycle recovery and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Acquisition,
    Allocation,
    Precondition,
    Detection,
    Encode,
    MountIo,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Acquisition => "acquisition",
            FailureKind::Allocation => "allocation",
            FailureKind::Precondition => "precondition",
            FailureKind::Detection => "detection",
            FailureKind::Encode => "encode",
            FailureKind::MountIo => "mount/io",
        };
        f.write_str(name)
    }
}

impl PipelineError {
    /// Taxonomy class of this error
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Camera(e) => match e {
                CameraError::Init(_) | CameraError::Capture | CameraError::Still(_) => {
                    FailureKind::Acquisition
                }
                CameraError::Allocation(_) => FailureKind::Allocation,
                CameraError::Format { .. }
                | CameraError::SizeMismatch { .. }
                | CameraError::InvalidCrop { .. }
                | CameraError::UnsupportedFormat(_) => FailureKind::Precondition,
            },
            PipelineError::Detect(_) => FailureKind::Detection,
            PipelineError::Storage(e) => match e {
                StorageError::Encode(EncodeError::Allocation(_)) => FailureKind::Allocation,
                StorageError::Encode(_) => FailureKind::Encode,
                StorageError::InvalidImage(_) => FailureKind::Precondition,
                _ => FailureKind::MountIo,
            },
            PipelineError::Config(_) => FailureKind::Precondition,
        }
    }
}

/// Install the global tracing subscriber (`RUST_LOG` aware, INFO by default)
pub fn init_logging() -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}

/// Start the configured mode. In capture mode this only returns on a
/// startup failure.
pub async fn run(config: PipelineConfig) -> Result<(), PipelineError> {
    match config.acquisition.mode {
        RunMode::Capture => run_capture(config).await,
        RunMode::Still => run_still(&config),
    }
}

async fn run_capture(config: PipelineConfig) -> Result<(), PipelineError> {
    let mut storage = StorageManager::new(
        config.storage.clone(),
        config.encoder.clone(),
        BoardMounter::default(),
    );
    info!("Mounting SD card...");
    if let Err(e) = storage.init() {
        error!("SD card init/mount failed: {}", e);
        return Err(e.into());
    }

    let mut detector = open_detector(&config)?;

    match &config.camera.still_image {
        Some(path) => {
            let camera = StillImageSource::open(path).map_err(|e| {
                error!("Camera initialization failed: {}", e);
                e
            })?;
            capture_forever(camera, detector.as_mut(), &mut storage, &config).await
        }
        None => open_sensor_and_capture(detector.as_mut(), &mut storage, &config).await,
    }
}

#[cfg(feature = "esp32")]
async fn open_sensor_and_capture<M: Mounter>(
    detector: &mut dyn Detector,
    storage: &mut StorageManager<M>,
    config: &PipelineConfig,
) -> Result<(), PipelineError> {
    let camera = camera_capture::ffi::CameraDriver::new(&config.camera).map_err(|e| {
        error!("Camera initialization failed: {}", e);
        e
    })?;
    capture_forever(camera, detector, storage, config).await
}

#[cfg(not(feature = "esp32"))]
async fn open_sensor_and_capture<M: Mounter>(
    _detector: &mut dyn Detector,
    _storage: &mut StorageManager<M>,
    _config: &PipelineConfig,
) -> Result<(), PipelineError> {
    error!("Camera initialization failed: no sensor driver in this build");
    Err(CameraError::Init("no sensor driver in this build; set camera.still_image".to_string()).into())
}

async fn capture_forever<C: FrameSource, M: Mounter>(
    camera: C,
    detector: &mut dyn Detector,
    storage: &mut StorageManager<M>,
    config: &PipelineConfig,
) -> Result<(), PipelineError> {
    let mut acquisition = AcquisitionLoop::new(camera, detector, storage, config);
    acquisition.run().await;
    Ok(())
}

fn run_still(config: &PipelineConfig) -> Result<(), PipelineError> {
    let path = config.camera.still_image.as_deref().ok_or_else(|| {
        PipelineError::Config("still mode needs camera.still_image".to_string())
    })?;
    let mut detector = open_detector(config)?;
    let selected = detect_still(path, detector.as_mut(), &config.detection)?;
    info!("Still image: {} detection(s)", selected.len());
    Ok(())
}

#[cfg(feature = "esp32")]
fn open_detector(config: &PipelineConfig) -> Result<Box<dyn Detector>, PipelineError> {
    let detector = detection::ffi::EspDetDetector::new(&config.detection, &config.storage.mount_point)?;
    Ok(Box::new(detector))
}

#[cfg(not(feature = "esp32"))]
fn open_detector(config: &PipelineConfig) -> Result<Box<dyn Detector>, PipelineError> {
    Ok(Box::new(detection::MockDetector::new(
        config.detection.mock_results.clone(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        assert_eq!(PipelineError::from(CameraError::Capture).kind(), FailureKind::Acquisition);
        assert_eq!(PipelineError::from(CameraError::Allocation(10)).kind(), FailureKind::Allocation);
        assert_eq!(
            PipelineError::from(CameraError::InvalidCrop {
                size: 224,
                width: 100,
                height: 100
            })
            .kind(),
            FailureKind::Precondition
        );
        assert_eq!(
            PipelineError::from(CameraError::UnsupportedFormat("Jpeg".to_string())).kind(),
            FailureKind::Precondition
        );
        assert_eq!(PipelineError::from(StorageError::NotMounted).kind(), FailureKind::MountIo);
        assert_eq!(
            PipelineError::from(StorageError::Encode(EncodeError::ScratchExhausted { capacity: 1 })).kind(),
            FailureKind::Encode
        );
        assert_eq!(
            PipelineError::from(DetectError::Inference("x".to_string())).kind(),
            FailureKind::Detection
        );
    }

    #[tokio::test]
    async fn test_still_mode_without_image_is_config_error() {
        let mut config = PipelineConfig::default();
        config.acquisition.mode = RunMode::Still;
        assert!(matches!(run(config).await, Err(PipelineError::Config(_))));
    }

    #[tokio::test]
    async fn test_capture_startup_fails_without_card() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = PipelineConfig::default();
        config.storage.mount_point = tmp.path().join("missing");

        let result = run(config).await;
        assert!(matches!(result, Err(PipelineError::Storage(StorageError::Mount(_)))));
        assert!(!tmp.path().join("missing").exists());
    }

    #[cfg(not(feature = "esp32"))]
    #[tokio::test]
    async fn test_capture_startup_fails_without_camera() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = PipelineConfig::default();
        config.storage.mount_point = tmp.path().to_path_buf();

        let result = run(config).await;
        assert!(matches!(result, Err(PipelineError::Camera(CameraError::Init(_)))));
        // nothing archived when startup fails
        assert!(!tmp.path().join("bumblebee_detect").exists());
    }
}
