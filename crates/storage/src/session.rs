//! Storage session and indexed archive

use camera_capture::{ImageBuffer, PixelFormat};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::encoder::{encode_jpeg, JpegConfig};
use crate::{StorageConfig, StorageError};

/// Permissions for directories created on the card
#[cfg(unix)]
const DIR_MODE: u32 = 0o775;

/// Archive file name for a directory holding `count` files
pub fn archive_file_name(count: usize) -> String {
    format!("bumblebee_{:04}.jpg", count + 1)
}

/// A mounted volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountHandle {
    root: PathBuf,
}

impl MountHandle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Mount point
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a path on the volume. Absolute paths are used as-is.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

/// Brings up the storage bus and mounts the volume
pub trait Mounter {
    fn mount(&mut self, config: &StorageConfig) -> Result<MountHandle, StorageError>;
}

/// Treats an existing host directory as the mounted volume.
///
/// A missing mount point is a mount failure; it is never created.
#[derive(Debug, Default)]
pub struct DirectoryMounter;

impl Mounter for DirectoryMounter {
    fn mount(&mut self, config: &StorageConfig) -> Result<MountHandle, StorageError> {
        let root = &config.mount_point;
        match fs::metadata(root) {
            Ok(meta) if meta.is_dir() => Ok(MountHandle::new(root.clone())),
            Ok(_) => Err(StorageError::Mount(format!(
                "{} is not a directory",
                root.display()
            ))),
            Err(e) => Err(StorageError::Mount(format!("{}: {}", root.display(), e))),
        }
    }
}

/// Storage manager.
///
/// Starts unmounted; [`StorageManager::init`] moves it to mounted for the rest
/// of its life. Every other operation fails with [`StorageError::NotMounted`]
/// before touching the filesystem while unmounted.
///
/// File indices come from counting the archive directory on every save, so
/// two concurrent savers could pick the same name. Saving takes `&mut self`,
/// which limits a manager to one writer at a time.
pub struct StorageManager<M: Mounter> {
    config: StorageConfig,
    encoder: JpegConfig,
    mounter: M,
    session: Option<MountHandle>,
}

impl<M: Mounter> StorageManager<M> {
    pub fn new(config: StorageConfig, encoder: JpegConfig, mounter: M) -> Self {
        Self {
            config,
            encoder,
            mounter,
            session: None,
        }
    }

    /// Mount the volume. A second call returns the existing session.
    pub fn init(&mut self) -> Result<&MountHandle, StorageError> {
        if self.session.is_none() {
            info!("Mounting storage at {}", self.config.mount_point.display());
            let handle = self.mounter.mount(&self.config).map_err(|e| {
                error!("Storage mount failed: {}", e);
                e
            })?;
            info!("Storage mounted at {}", handle.root().display());
            self.session = Some(handle);
        }
        self.session()
    }

    pub fn is_mounted(&self) -> bool {
        self.session.is_some()
    }

    /// Active session
    pub fn session(&self) -> Result<&MountHandle, StorageError> {
        self.session.as_ref().ok_or(StorageError::NotMounted)
    }

    pub fn mounter(&self) -> &M {
        &self.mounter
    }

    /// Configured archive directory on the mounted volume
    pub fn archive_dir(&self) -> Result<PathBuf, StorageError> {
        Ok(self.session()?.resolve(&self.config.archive_dir))
    }

    /// Make sure `path` is a directory, creating it if missing
    pub fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        let path = self.session()?.resolve(path);

        match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => {
                debug!("Dir already exists: {}", path.display());
                return Ok(());
            }
            Ok(_) => {
                error!("Path exists but is not a directory: {}", path.display());
                return Err(StorageError::NotADirectory(path));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::CreateDir { path, source: e }),
        }

        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(DIR_MODE);
        }
        builder.create(&path).map_err(|e| {
            error!("mkdir failed for {}: {}", path.display(), e);
            StorageError::CreateDir {
                path: path.clone(),
                source: e,
            }
        })?;
        info!("Created dir: {}", path.display());
        Ok(())
    }

    /// Count regular files in `path`. Subdirectories, and links that resolve to
    /// directories, are not counted.
    pub fn next_index(&self, path: &Path) -> Result<usize, StorageError> {
        let path = self.session()?.resolve(path);
        let entries = fs::read_dir(&path).map_err(|e| {
            error!("Failed to open directory {}: {}", path.display(), e);
            StorageError::ReadDir {
                path: path.clone(),
                source: e,
            }
        })?;

        let mut count = 0;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Could not read entry in {}: {}", path.display(), e);
                    continue;
                }
            };
            let name = entry.file_name();
            if name == "." || name == ".." {
                continue;
            }
            // follow links like stat(2)
            match fs::metadata(entry.path()) {
                Ok(meta) if meta.is_file() => count += 1,
                Ok(_) => {}
                Err(e) => warn!("Could not stat file {}: {}", entry.path().display(), e),
            }
        }
        Ok(count)
    }

    /// Encode `image` and write it as the next archive file in `directory`.
    ///
    /// Returns the path written. Bytes are staged in a hidden file and renamed
    /// into place, so a failed write never leaves a partial file under the
    /// computed name.
    pub fn save(&mut self, image: &ImageBuffer, directory: &Path) -> Result<PathBuf, StorageError> {
        let session = self.session().map_err(|e| {
            error!("save: storage not mounted");
            e
        })?;
        if image.data().is_empty() {
            return Err(StorageError::InvalidImage("image has no data".to_string()));
        }
        if image.format() != PixelFormat::Rgb888 {
            return Err(StorageError::InvalidImage(format!(
                "image is {}, not RGB888",
                image.format()
            )));
        }

        self.ensure_directory(directory)?;

        let jpeg = encode_jpeg(image, &self.encoder).map_err(|e| {
            error!("JPEG encoding failed: {}", e);
            StorageError::from(e)
        })?;

        let index = self.next_index(directory)?;
        let dir = session.resolve(directory);
        let target = dir.join(archive_file_name(index));

        info!("Saving JPEG ({} bytes): {}", jpeg.len(), target.display());
        write_staged(&dir, &target, jpeg.data()).map_err(|e| {
            error!("Failed to save JPEG {}: {}", target.display(), e);
            StorageError::Write {
                path: target.clone(),
                source: e,
            }
        })?;

        info!("Saved successfully");
        Ok(target)
    }

    /// [`StorageManager::save`] into the configured archive directory
    pub fn save_to_archive(&mut self, image: &ImageBuffer) -> Result<PathBuf, StorageError> {
        let archive = self.config.archive_dir.clone();
        self.save(image, &archive)
    }
}

/// Write `bytes` to a hidden sibling of `target`, then rename it into place
fn write_staged(dir: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    let name = target
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "target has no file name"))?;
    let mut staged_name = std::ffi::OsString::from(".");
    staged_name.push(name);
    staged_name.push(".part");
    let staging = dir.join(staged_name);

    let result = File::create(&staging)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&staging, target));

    if result.is_err() {
        if let Err(e) = fs::remove_file(&staging) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Could not remove staging file {}: {}", staging.display(), e);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Directory mounter that records how often it was asked to mount
    #[derive(Default)]
    struct CountingMounter {
        mounts: usize,
    }

    impl Mounter for CountingMounter {
        fn mount(&mut self, config: &StorageConfig) -> Result<MountHandle, StorageError> {
            self.mounts += 1;
            DirectoryMounter.mount(config)
        }
    }

    fn manager(root: &Path) -> StorageManager<CountingMounter> {
        let config = StorageConfig {
            mount_point: root.to_path_buf(),
            ..Default::default()
        };
        StorageManager::new(config, JpegConfig::default(), CountingMounter::default())
    }

    fn mounted(root: &Path) -> StorageManager<CountingMounter> {
        let mut storage = manager(root);
        storage.init().unwrap();
        storage
    }

    fn cropped() -> ImageBuffer {
        let mut image = ImageBuffer::zeroed(224, 224, PixelFormat::Rgb888).unwrap();
        for (i, byte) in image.data_mut().iter_mut().enumerate() {
            *byte = (i % 200) as u8;
        }
        image
    }

    fn file_name(path: &Path) -> String {
        path.file_name().unwrap().to_string_lossy().into_owned()
    }

    #[test]
    fn test_file_name_padding() {
        assert_eq!(archive_file_name(0), "bumblebee_0001.jpg");
        assert_eq!(archive_file_name(41), "bumblebee_0042.jpg");
        assert_eq!(archive_file_name(9999), "bumblebee_10000.jpg");
    }

    #[test]
    fn test_init_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let mut storage = manager(tmp.path());

        assert!(storage.init().is_ok());
        assert!(storage.init().is_ok());
        assert!(storage.is_mounted());
        assert_eq!(storage.mounter().mounts, 1);
    }

    #[test]
    fn test_mount_failure_stays_unmounted() {
        let tmp = TempDir::new().unwrap();
        let mut storage = manager(&tmp.path().join("no-card"));

        assert!(matches!(storage.init(), Err(StorageError::Mount(_))));
        assert!(!storage.is_mounted());
        assert!(matches!(storage.session(), Err(StorageError::NotMounted)));
    }

    #[test]
    fn test_save_while_unmounted_does_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut storage = manager(tmp.path());

        let result = storage.save(&cropped(), Path::new("bumblebee_detect"));
        assert!(matches!(result, Err(StorageError::NotMounted)));
        assert!(!tmp.path().join("bumblebee_detect").exists());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
        assert_eq!(storage.mounter().mounts, 0);
    }

    #[test]
    fn test_directory_ops_require_mount() {
        let tmp = TempDir::new().unwrap();
        let storage = manager(tmp.path());
        assert!(matches!(
            storage.ensure_directory(Path::new("a")),
            Err(StorageError::NotMounted)
        ));
        assert!(matches!(storage.next_index(Path::new(".")), Err(StorageError::NotMounted)));
        assert!(!tmp.path().join("a").exists());
    }

    #[test]
    fn test_ensure_directory() {
        let tmp = TempDir::new().unwrap();
        let storage = mounted(tmp.path());

        storage.ensure_directory(Path::new("archive")).unwrap();
        assert!(tmp.path().join("archive").is_dir());
        // existing directory is fine
        storage.ensure_directory(Path::new("archive")).unwrap();

        fs::write(tmp.path().join("plain"), b"x").unwrap();
        assert!(matches!(
            storage.ensure_directory(Path::new("plain")),
            Err(StorageError::NotADirectory(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_created_directory_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let storage = mounted(tmp.path());
        storage.ensure_directory(Path::new("archive")).unwrap();

        let mode = fs::metadata(tmp.path().join("archive")).unwrap().permissions().mode();
        // umask may only clear bits
        assert_eq!(mode & !DIR_MODE & 0o777, 0);
    }

    #[test]
    fn test_next_index_counts_regular_files_only() {
        let tmp = TempDir::new().unwrap();
        let storage = mounted(tmp.path());
        let dir = tmp.path().join("archive");
        fs::create_dir(&dir).unwrap();

        assert_eq!(storage.next_index(Path::new("archive")).unwrap(), 0);

        fs::write(dir.join("a.jpg"), b"a").unwrap();
        fs::write(dir.join("notes.txt"), b"b").unwrap();
        fs::create_dir(dir.join("nested")).unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink(dir.join("nested"), dir.join("link-to-dir")).unwrap();

        assert_eq!(storage.next_index(Path::new("archive")).unwrap(), 2);
    }

    #[test]
    fn test_next_index_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let storage = mounted(tmp.path());
        assert!(matches!(
            storage.next_index(Path::new("missing")),
            Err(StorageError::ReadDir { .. })
        ));
    }

    #[test]
    fn test_save_sequence_and_live_index() {
        let tmp = TempDir::new().unwrap();
        let mut storage = mounted(tmp.path());
        let archive = Path::new("bumblebee_detect");

        let first = storage.save(&cropped(), archive).unwrap();
        let second = storage.save(&cropped(), archive).unwrap();
        assert_eq!(file_name(&first), "bumblebee_0001.jpg");
        assert_eq!(file_name(&second), "bumblebee_0002.jpg");

        let bytes = fs::read(&first).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        // index follows the live count, not a stored counter
        fs::remove_file(&first).unwrap();
        assert_eq!(storage.next_index(archive).unwrap(), 1);
        let third = storage.save(&cropped(), archive).unwrap();
        assert_eq!(file_name(&third), "bumblebee_0002.jpg");
        assert_eq!(storage.next_index(archive).unwrap(), 1);
    }

    #[test]
    fn test_save_to_archive_uses_configured_dir() {
        let tmp = TempDir::new().unwrap();
        let mut storage = mounted(tmp.path());

        let path = storage.save_to_archive(&cropped()).unwrap();
        assert_eq!(path, tmp.path().join("bumblebee_detect").join("bumblebee_0001.jpg"));
        assert_eq!(storage.archive_dir().unwrap(), tmp.path().join("bumblebee_detect"));
    }

    #[test]
    fn test_save_rejects_rgb565() {
        let tmp = TempDir::new().unwrap();
        let mut storage = mounted(tmp.path());
        let image = ImageBuffer::zeroed(8, 8, PixelFormat::Rgb565).unwrap();

        let result = storage.save(&image, Path::new("bumblebee_detect"));
        assert!(matches!(result, Err(StorageError::InvalidImage(_))));
        assert!(!tmp.path().join("bumblebee_detect").exists());
    }

    #[test]
    fn test_encode_failure_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let config = StorageConfig {
            mount_point: tmp.path().to_path_buf(),
            ..Default::default()
        };
        let encoder = JpegConfig {
            scratch_capacity: 32,
            ..Default::default()
        };
        let mut storage = StorageManager::new(config, encoder, DirectoryMounter);
        storage.init().unwrap();

        let result = storage.save_to_archive(&cropped());
        assert!(matches!(result, Err(StorageError::Encode(_))));
        assert_eq!(storage.next_index(Path::new("bumblebee_detect")).unwrap(), 0);
    }

    #[test]
    fn test_failed_write_leaves_no_file() {
        let tmp = TempDir::new().unwrap();
        let mut storage = mounted(tmp.path());
        let dir = tmp.path().join("bumblebee_detect");
        fs::create_dir(&dir).unwrap();
        // a directory squatting on the computed name makes the rename fail
        fs::create_dir(dir.join("bumblebee_0001.jpg")).unwrap();

        let result = storage.save(&cropped(), Path::new("bumblebee_detect"));
        assert!(matches!(result, Err(StorageError::Write { .. })));
        assert!(dir.join("bumblebee_0001.jpg").is_dir());
        assert!(!dir.join(".bumblebee_0001.jpg.part").exists());
        assert_eq!(storage.next_index(Path::new("bumblebee_detect")).unwrap(), 0);
    }
}
