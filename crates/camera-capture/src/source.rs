//! Camera collaborator seam
//!
//! A [`FrameSource`] hands out frames that borrow driver memory. The borrow ends
//! when the frame is dropped, which is where implementations return the buffer
//! to the driver.

use std::path::Path;
use tracing::{debug, info};

use crate::frame::{ImageBuffer, PixelFormat};
use crate::CameraError;

/// A frame still owned by the camera driver
pub trait RawFrame {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn format(&self) -> PixelFormat;
    /// Driver bytes, valid until the frame is dropped
    fn data(&self) -> &[u8];

    /// Copy the driver bytes into a process-owned buffer
    fn to_owned_image(&self) -> Result<ImageBuffer, CameraError> {
        ImageBuffer::copy_from_slice(self.width(), self.height(), self.format(), self.data())
    }
}

/// Anything that can produce camera frames
pub trait FrameSource {
    type Frame<'a>: RawFrame
    where
        Self: 'a;

    /// Grab the next frame. Dropping the returned frame releases it.
    fn acquire_frame(&mut self) -> Result<Self::Frame<'_>, CameraError>;
}

/// Frame source backed by a JPEG on disk.
///
/// The image is decoded once and re-encoded as big-endian RGB565 so that the
/// pipeline sees the same bytes the sensor would deliver.
pub struct StillImageSource {
    width: u32,
    height: u32,
    packed: Vec<u8>,
    served: u64,
}

/// Frame handed out by [`StillImageSource`]
pub struct StillFrame<'a> {
    source: &'a StillImageSource,
}

impl StillImageSource {
    /// Decode `path` and pack it as RGB565
    pub fn open(path: &Path) -> Result<Self, CameraError> {
        let decoded = image::open(path)
            .map_err(|e| CameraError::Still(format!("{}: {}", path.display(), e)))?
            .to_rgb8();
        info!(
            "Loaded still image {} ({}x{})",
            path.display(),
            decoded.width(),
            decoded.height()
        );
        Ok(Self::from_rgb888(decoded.width(), decoded.height(), decoded.as_raw()))
    }

    /// Pack an RGB888 pixel slice as RGB565
    pub fn from_rgb888(width: u32, height: u32, rgb: &[u8]) -> Self {
        let packed = rgb
            .chunks_exact(3)
            .flat_map(|p| pack_rgb565(p[0], p[1], p[2]))
            .collect();
        Self {
            width,
            height,
            packed,
            served: 0,
        }
    }

    /// Frames handed out so far
    pub fn frames_served(&self) -> u64 {
        self.served
    }
}

/// Truncate an RGB888 pixel to big-endian RGB565
pub fn pack_rgb565(r: u8, g: u8, b: u8) -> [u8; 2] {
    let pixel = ((r as u16 & 0xF8) << 8) | ((g as u16 & 0xFC) << 3) | (b as u16 >> 3);
    pixel.to_be_bytes()
}

impl FrameSource for StillImageSource {
    type Frame<'a> = StillFrame<'a> where Self: 'a;

    fn acquire_frame(&mut self) -> Result<StillFrame<'_>, CameraError> {
        if self.packed.is_empty() {
            return Err(CameraError::Capture);
        }
        self.served += 1;
        debug!("Serving still frame #{}", self.served);
        Ok(StillFrame { source: self })
    }
}

impl RawFrame for StillFrame<'_> {
    fn width(&self) -> u32 {
        self.source.width
    }

    fn height(&self) -> u32 {
        self.source.height
    }

    fn format(&self) -> PixelFormat {
        PixelFormat::Rgb565
    }

    fn data(&self) -> &[u8] {
        &self.source.packed
    }
}
