//! Storage Layer
//!
//! Owns the SD card session and the image archive on it. Archived images are
//! JPEG encoded and named `bumblebee_NNNN.jpg`, where the number is derived from
//! the live file count of the archive directory.

mod encoder;
#[cfg(feature = "esp32")]
pub mod ffi;
mod session;

pub use encoder::{encode_jpeg, CompressedImage, JpegConfig};
pub use session::{archive_file_name, DirectoryMounter, MountHandle, Mounter, StorageManager};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage not mounted")]
    NotMounted,
    #[error("Storage bus init failed: {0}")]
    Bus(String),
    #[error("Mount failed: {0}")]
    Mount(String),
    #[error("Path exists but is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to open directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid image: {0}")]
    InvalidImage(String),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// JPEG encoding errors
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Invalid encoder input: {0}")]
    InvalidInput(String),
    #[error("Scratch buffer allocation of {0} bytes failed")]
    Allocation(usize),
    #[error("Compressed image exceeds the {capacity} byte scratch buffer")]
    ScratchExhausted { capacity: usize },
    #[error("Encoder worker failed: {0}")]
    Worker(String),
    #[error("JPEG encoding failed: {0}")]
    Codec(String),
}

/// SD card and archive configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Filesystem mount point of the card
    pub mount_point: PathBuf,
    /// Archive directory, relative to the mount point
    pub archive_dir: PathBuf,
    /// SPI clock for the card
    pub bus_speed_khz: u32,
    /// Simultaneously open files on the FAT volume
    pub max_open_files: u32,
    /// FAT allocation unit size in bytes
    pub allocation_unit_size: u32,
    /// Format the card when mounting fails
    pub format_if_mount_failed: bool,
    /// Largest single SPI DMA transfer
    pub max_transfer_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mount_point: PathBuf::from("/sdcard"),
            archive_dir: PathBuf::from("bumblebee_detect"),
            bus_speed_khz: 5000,
            max_open_files: 5,
            allocation_unit_size: 16 * 1024,
            format_if_mount_failed: false,
            max_transfer_size: 4000,
        }
    }
}
