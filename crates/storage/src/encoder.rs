//! JPEG encoding into a fixed-size scratch buffer
//!
//! Compression runs on a short-lived worker thread while the caller blocks on
//! the join. The scratch buffer never grows: output that does not fit fails the
//! call with [`EncodeError::ScratchExhausted`].

use camera_capture::{ImageBuffer, PixelFormat};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::thread;
use tracing::debug;

use crate::EncodeError;

/// Encoder settings. Chroma is never subsampled (4:4:4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JpegConfig {
    /// JPEG quality, 1..=100
    pub quality: u8,
    /// Output scratch buffer size in bytes
    pub scratch_capacity: usize,
}

impl Default for JpegConfig {
    fn default() -> Self {
        Self {
            quality: 80,
            scratch_capacity: 100 * 1024,
        }
    }
}

/// Owned JPEG byte stream
#[derive(Debug)]
pub struct CompressedImage {
    data: Vec<u8>,
}

impl CompressedImage {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Writer over a preallocated buffer that refuses to grow
struct ScratchWriter {
    buf: Vec<u8>,
    capacity: usize,
    exhausted: bool,
}

impl Write for ScratchWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.len() > self.capacity - self.buf.len() {
            self.exhausted = true;
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "jpeg scratch buffer full",
            ));
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Compress an RGB888 image
pub fn encode_jpeg(image: &ImageBuffer, config: &JpegConfig) -> Result<CompressedImage, EncodeError> {
    if image.format() != PixelFormat::Rgb888 {
        return Err(EncodeError::InvalidInput(format!(
            "expected RGB888, got {}",
            image.format()
        )));
    }
    if !(1..=100).contains(&config.quality) {
        return Err(EncodeError::InvalidInput(format!(
            "quality {} outside 1..=100",
            config.quality
        )));
    }

    let capacity = config.scratch_capacity;
    let mut scratch = Vec::new();
    scratch
        .try_reserve_exact(capacity)
        .map_err(|_| EncodeError::Allocation(capacity))?;
    let mut sink = ScratchWriter {
        buf: scratch,
        capacity,
        exhausted: false,
    };

    let result = thread::scope(|scope| {
        let worker = thread::Builder::new()
            .name("jpeg-enc".to_string())
            .spawn_scoped(scope, || {
                JpegEncoder::new_with_quality(&mut sink, config.quality).encode(
                    image.data(),
                    image.width(),
                    image.height(),
                    ExtendedColorType::Rgb8,
                )
            })
            .map_err(|e| EncodeError::Worker(e.to_string()))?;
        worker
            .join()
            .map_err(|_| EncodeError::Worker("encoder thread panicked".to_string()))
    })?;

    if sink.exhausted {
        return Err(EncodeError::ScratchExhausted { capacity });
    }
    match result {
        Ok(()) => {
            debug!(
                "Encoded {}x{} to {} bytes",
                image.width(),
                image.height(),
                sink.buf.len()
            );
            Ok(CompressedImage { data: sink.buf })
        }
        Err(e) => Err(EncodeError::Codec(e.to_string())),
    }
}
