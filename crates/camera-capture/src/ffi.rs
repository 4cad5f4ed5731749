//! FFI bindings for the board camera shim (esp32-camera)

use libc::{c_int, size_t};
use std::ptr::NonNull;
use tracing::{error, info};

use crate::frame::PixelFormat;
use crate::source::{FrameSource, RawFrame};
use crate::{CameraConfig, CameraError};

/// C pixel format enum (subset of `pixformat_t`)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CPixelFormat {
    Rgb565 = 0,
    Yuv422 = 1,
    Yuv420 = 2,
    Grayscale = 3,
    Jpeg = 4,
    Rgb888 = 5,
}

/// C frame buffer (leading fields of `camera_fb_t`)
#[repr(C)]
pub struct CFrameBuffer {
    pub buf: *mut u8,
    pub len: size_t,
    pub width: size_t,
    pub height: size_t,
    pub format: CPixelFormat,
}

/// C camera configuration; pin mapping lives in the shim
#[repr(C)]
pub struct CCameraConfig {
    pub xclk_freq_hz: c_int,
    pub pixel_format: CPixelFormat,
    pub frame_width: u32,
    pub frame_height: u32,
    pub fb_count: u32,
    /// 1 = frame buffers in PSRAM
    pub fb_in_psram: c_int,
}

extern "C" {
    fn camera_init(config: *const CCameraConfig) -> c_int;
    fn camera_deinit();
    fn camera_fb_get() -> *mut CFrameBuffer;
    fn camera_fb_return(fb: *mut CFrameBuffer);
}

/// Driver formats the pipeline can carry; the rest are rejected at capture
fn pixel_format(format: CPixelFormat) -> Option<PixelFormat> {
    match format {
        CPixelFormat::Rgb565 => Some(PixelFormat::Rgb565),
        CPixelFormat::Rgb888 => Some(PixelFormat::Rgb888),
        CPixelFormat::Yuv422 | CPixelFormat::Yuv420 | CPixelFormat::Grayscale | CPixelFormat::Jpeg => None,
    }
}

/// Camera driver wrapper
pub struct CameraDriver {
    _private: (),
}

impl CameraDriver {
    /// Initialize the sensor
    pub fn new(config: &CameraConfig) -> Result<Self, CameraError> {
        config.validate()?;

        let c_config = CCameraConfig {
            xclk_freq_hz: config.xclk_freq_hz as c_int,
            pixel_format: CPixelFormat::Rgb565,
            frame_width: config.frame_width,
            frame_height: config.frame_height,
            fb_count: config.fb_count,
            fb_in_psram: 1,
        };

        let ret = unsafe { camera_init(&c_config) };
        if ret != 0 {
            error!("Camera init failed: {}", ret);
            return Err(CameraError::Init(format!("esp_err {}", ret)));
        }

        info!(
            "Camera initialized: {}x{} {} @ {} Hz",
            config.frame_width, config.frame_height, config.pixel_format, config.xclk_freq_hz
        );
        Ok(Self { _private: () })
    }
}

impl FrameSource for CameraDriver {
    type Frame<'a> = CapturedFrame<'a> where Self: 'a;

    fn acquire_frame(&mut self) -> Result<CapturedFrame<'_>, CameraError> {
        let ptr = unsafe { camera_fb_get() };
        let ptr = NonNull::new(ptr).ok_or(CameraError::Capture)?;
        let c_format = unsafe { ptr.as_ref().format };
        let Some(format) = pixel_format(c_format) else {
            unsafe { camera_fb_return(ptr.as_ptr()) };
            error!("Driver delivered a {:?} frame", c_format);
            return Err(CameraError::UnsupportedFormat(format!("{:?}", c_format)));
        };
        Ok(CapturedFrame {
            ptr,
            format,
            _driver: std::marker::PhantomData,
        })
    }
}

impl Drop for CameraDriver {
    fn drop(&mut self) {
        unsafe { camera_deinit() };
    }
}

/// Captured frame with RAII return to the driver
pub struct CapturedFrame<'a> {
    ptr: NonNull<CFrameBuffer>,
    format: PixelFormat,
    _driver: std::marker::PhantomData<&'a mut CameraDriver>,
}

impl RawFrame for CapturedFrame<'_> {
    fn width(&self) -> u32 {
        unsafe { self.ptr.as_ref().width as u32 }
    }

    fn height(&self) -> u32 {
        unsafe { self.ptr.as_ref().height as u32 }
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn data(&self) -> &[u8] {
        unsafe {
            let fb = self.ptr.as_ref();
            std::slice::from_raw_parts(fb.buf, fb.len)
        }
    }
}

impl Drop for CapturedFrame<'_> {
    fn drop(&mut self) {
        unsafe { camera_fb_return(self.ptr.as_ptr()) };
    }
}
