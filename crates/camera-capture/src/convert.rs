//! Pixel conversion and cropping stages
//!
//! Both stages borrow their input and return a freshly allocated buffer. The
//! caller keeps ownership of the input and drops it once the output exists.

use crate::frame::{ImageBuffer, PixelFormat};
use crate::CameraError;

/// Expand one big-endian RGB565 pixel to RGB888.
///
/// Each channel is widened by bit replication: the top bits of the channel are
/// copied into the newly opened low bits, so 0 maps to 0 and full scale maps to 255.
#[inline]
pub fn expand_rgb565(hi: u8, lo: u8) -> [u8; 3] {
    let pixel = u16::from_be_bytes([hi, lo]);
    let r5 = ((pixel >> 11) & 0x1F) as u8;
    let g6 = ((pixel >> 5) & 0x3F) as u8;
    let b5 = (pixel & 0x1F) as u8;
    [
        (r5 << 3) | (r5 >> 2),
        (g6 << 2) | (g6 >> 4),
        (b5 << 3) | (b5 >> 2),
    ]
}

/// Convert a packed RGB565 buffer into a new RGB888 buffer of the same extent
pub fn rgb565_to_rgb888(src: &ImageBuffer) -> Result<ImageBuffer, CameraError> {
    src.require_format(PixelFormat::Rgb565)?;

    let mut dst = ImageBuffer::zeroed(src.width(), src.height(), PixelFormat::Rgb888)?;
    for (packed, rgb) in src
        .data()
        .chunks_exact(2)
        .zip(dst.data_mut().chunks_exact_mut(3))
    {
        rgb.copy_from_slice(&expand_rgb565(packed[0], packed[1]));
    }
    Ok(dst)
}

/// Top-left corner of a centered `size` x `size` window
pub fn crop_origin(width: u32, height: u32, size: u32) -> Option<(u32, u32)> {
    if size == 0 || size > width || size > height {
        return None;
    }
    Some(((width - size) / 2, (height - size) / 2))
}

/// Copy the centered `size` x `size` region of an RGB888 buffer into a new buffer
pub fn center_crop(src: &ImageBuffer, size: u32) -> Result<ImageBuffer, CameraError> {
    src.require_format(PixelFormat::Rgb888)?;

    let (x0, y0) = crop_origin(src.width(), src.height(), size).ok_or(CameraError::InvalidCrop {
        size,
        width: src.width(),
        height: src.height(),
    })?;

    let mut dst = ImageBuffer::zeroed(size, size, PixelFormat::Rgb888)?;
    let row_len = size as usize * 3;
    let src_stride = src.width() as usize * 3;
    let src_data = src.data();

    for (y, row) in dst.data_mut().chunks_exact_mut(row_len).enumerate() {
        let start = (y0 as usize + y) * src_stride + x0 as usize * 3;
        row.copy_from_slice(&src_data[start..start + row_len]);
    }
    Ok(dst)
}
