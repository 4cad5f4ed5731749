//! FFI bindings for the board SD-over-SPI shim (FAT via esp_vfs_fat)

use libc::{c_char, c_int, c_void};
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::ptr;
use tracing::{error, info};

use crate::session::{MountHandle, Mounter};
use crate::{StorageConfig, StorageError};

/// `ESP_FAIL`: the filesystem itself could not be mounted
const ESP_FAIL: c_int = -1;

/// C mount configuration; SPI pins live in the shim
#[repr(C)]
pub struct CSdMountConfig {
    pub mount_point: *const c_char,
    pub max_freq_khz: c_int,
    pub max_files: c_int,
    pub allocation_unit_size: usize,
    pub format_if_mount_failed: bool,
    pub max_transfer_sz: c_int,
}

extern "C" {
    fn sdspi_bus_init(config: *const CSdMountConfig) -> c_int;
    fn sdspi_mount(config: *const CSdMountConfig, card: *mut *mut c_void) -> c_int;
    fn sdspi_print_card_info(card: *const c_void);
}

/// Mounts the SD card over SPI
#[derive(Default)]
pub struct SdSpiMounter {
    card: Option<ptr::NonNull<c_void>>,
}

impl Mounter for SdSpiMounter {
    fn mount(&mut self, config: &StorageConfig) -> Result<MountHandle, StorageError> {
        let mount_point = CString::new(config.mount_point.as_os_str().as_bytes())
            .map_err(|e| StorageError::Mount(e.to_string()))?;
        let c_config = CSdMountConfig {
            mount_point: mount_point.as_ptr(),
            max_freq_khz: config.bus_speed_khz as c_int,
            max_files: config.max_open_files as c_int,
            allocation_unit_size: config.allocation_unit_size as usize,
            format_if_mount_failed: config.format_if_mount_failed,
            max_transfer_sz: config.max_transfer_size as c_int,
        };

        info!("Initializing SPI bus at {} kHz", config.bus_speed_khz);
        let ret = unsafe { sdspi_bus_init(&c_config) };
        if ret != 0 {
            error!("Failed to initialize SPI bus: {}", ret);
            return Err(StorageError::Bus(format!("esp_err {}", ret)));
        }

        info!("Mounting FAT filesystem at {}", config.mount_point.display());
        let mut card: *mut c_void = ptr::null_mut();
        let ret = unsafe { sdspi_mount(&c_config, &mut card) };
        if ret != 0 {
            if ret == ESP_FAIL {
                error!("Failed to mount filesystem; card may need formatting");
            } else {
                error!("Failed to initialize the card ({}); check SD line pull-ups", ret);
            }
            return Err(StorageError::Mount(format!("esp_err {}", ret)));
        }

        self.card = ptr::NonNull::new(card);
        if let Some(card) = self.card {
            unsafe { sdspi_print_card_info(card.as_ptr()) };
        }
        Ok(MountHandle::new(config.mount_point.clone()))
    }
}
