//! Standard device and mount paths for a shared volume.

use std::path::PathBuf;

use once_cell::sync::Lazy;

use crate::volume::{DataEngine, mapper_name};

/// Default directory holding raw volume block devices.
pub static VOLSHARE_DEV_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("VOLSHARE_DEV_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/dev/longhorn"))
});

/// Default directory holding device-mapper targets.
pub static VOLSHARE_MAPPER_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("VOLSHARE_MAPPER_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/dev/mapper"))
});

/// Default directory under which volumes are mounted and exported.
pub static VOLSHARE_EXPORT_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("VOLSHARE_EXPORT_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/export"))
});

/// Path conventions used by the share manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharePaths {
    /// Raw block device directory (default: /dev/longhorn).
    pub dev_root: PathBuf,
    /// Device-mapper directory (default: /dev/mapper).
    pub mapper_root: PathBuf,
    /// Export root directory (default: /export).
    pub export_root: PathBuf,
}

impl SharePaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths rooted below a single directory.
    ///
    /// Used to run against a scratch tree instead of the host's `/dev`.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            dev_root: root.join("dev/longhorn"),
            mapper_root: root.join("dev/mapper"),
            export_root: root.join("export"),
        }
    }

    /// Raw (pre-decryption) block device of a volume.
    #[must_use]
    pub fn raw_device(&self, volume: &str) -> PathBuf {
        self.dev_root.join(volume)
    }

    /// Decrypted device-mapper device of a volume.
    #[must_use]
    pub fn mapped_device(&self, volume: &str, data_engine: DataEngine) -> PathBuf {
        self.mapper_root.join(mapper_name(volume, data_engine))
    }

    /// Block device holding the volume's filesystem.
    #[must_use]
    pub fn device(&self, volume: &str, data_engine: DataEngine, encrypted: bool) -> PathBuf {
        if encrypted {
            self.mapped_device(volume, data_engine)
        } else {
            self.raw_device(volume)
        }
    }

    /// Mount point of a volume, which is also its exported path.
    #[must_use]
    pub fn mount_path(&self, volume: &str) -> PathBuf {
        self.export_root.join(volume)
    }

    /// Create the export root directory.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn create_dirs(&self) -> std::io::Result<()> {
        tracing::debug!(export_root = %self.export_root.display(), "Creating export root");
        std::fs::create_dir_all(&self.export_root)
    }
}

impl Default for SharePaths {
    fn default() -> Self {
        Self {
            dev_root: VOLSHARE_DEV_ROOT.clone(),
            mapper_root: VOLSHARE_MAPPER_ROOT.clone(),
            export_root: VOLSHARE_EXPORT_ROOT.clone(),
        }
    }
}
