//! Image buffer types shared by every pipeline stage

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::CameraError;

/// Pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Packed 5-6-5, two bytes per pixel, high byte first
    Rgb565,
    /// 8 bits per channel, R G B interleaved
    Rgb888,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb565 => 2,
            PixelFormat::Rgb888 => 3,
        }
    }

    /// Byte length of a `width` x `height` image in this format
    pub fn buffer_len(&self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Rgb565 => write!(f, "RGB565"),
            PixelFormat::Rgb888 => write!(f, "RGB888"),
        }
    }
}

/// Allocate a zeroed byte buffer without aborting on exhaustion
pub(crate) fn try_alloc(len: usize) -> Result<Vec<u8>, CameraError> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| CameraError::Allocation(len))?;
    data.resize(len, 0);
    Ok(data)
}

/// Owned image buffer.
///
/// The byte length always matches `width * height * bytes_per_pixel`. Not
/// `Clone`: each stage allocates its own output and the caller drops the input.
pub struct ImageBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl ImageBuffer {
    /// Wrap existing bytes, checking the length against the declared format
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self, CameraError> {
        let expected = format.buffer_len(width, height);
        if data.len() != expected {
            return Err(CameraError::SizeMismatch {
                width,
                height,
                format,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Allocate a zero-filled buffer
    pub fn zeroed(width: u32, height: u32, format: PixelFormat) -> Result<Self, CameraError> {
        let data = try_alloc(format.buffer_len(width, height))?;
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Copy a driver frame into a process-owned buffer
    pub fn copy_from_slice(
        width: u32,
        height: u32,
        format: PixelFormat,
        bytes: &[u8],
    ) -> Result<Self, CameraError> {
        let mut image = Self::zeroed(width, height, format)?;
        if bytes.len() != image.data.len() {
            return Err(CameraError::SizeMismatch {
                width,
                height,
                format,
                expected: image.data.len(),
                actual: bytes.len(),
            });
        }
        image.data.copy_from_slice(bytes);
        Ok(image)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw pixel bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable pixel bytes (length is fixed)
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Get RGB888 pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if self.format != PixelFormat::Rgb888 || x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Ensure the buffer holds `expected` pixels
    pub fn require_format(&self, expected: PixelFormat) -> Result<(), CameraError> {
        if self.format != expected {
            return Err(CameraError::Format {
                expected,
                actual: self.format,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for ImageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_checks_stride() {
        assert!(ImageBuffer::new(4, 2, PixelFormat::Rgb565, vec![0; 16]).is_ok());
        let err = ImageBuffer::new(4, 2, PixelFormat::Rgb888, vec![0; 16]).unwrap_err();
        assert!(matches!(err, CameraError::SizeMismatch { expected: 24, actual: 16, .. }));
    }

    #[test]
    fn test_copy_from_slice_owns_bytes() {
        let driver_bytes = vec![7u8; 8];
        let image = ImageBuffer::copy_from_slice(2, 2, PixelFormat::Rgb565, &driver_bytes).unwrap();
        drop(driver_bytes);
        assert_eq!(image.data(), &[7u8; 8]);
    }

    #[test]
    fn test_copy_from_slice_rejects_short_frame() {
        let result = ImageBuffer::copy_from_slice(2, 2, PixelFormat::Rgb565, &[0u8; 6]);
        assert!(result.is_err());
    }

    #[test]
    fn test_get_pixel_bounds() {
        let mut image = ImageBuffer::zeroed(2, 2, PixelFormat::Rgb888).unwrap();
        image.data_mut()[9..12].copy_from_slice(&[1, 2, 3]);
        assert_eq!(image.get_pixel(1, 1), Some([1, 2, 3]));
        assert_eq!(image.get_pixel(2, 0), None);
    }

    #[test]
    fn test_huge_allocation_fails_cleanly() {
        let result = try_alloc(usize::MAX);
        assert!(matches!(result, Err(CameraError::Allocation(_))));
    }
}
