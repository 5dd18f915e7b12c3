//! Host filesystem and block device operations.
//!
//! This module handles:
//! - Mount point queries against `/proc/self/mountinfo`
//! - Format-and-mount and unmount of the volume device
//! - Block device validation, identification and live resize

mod device;
mod mounts;

use std::path::{Path, PathBuf};

use volshare_common::VolshareResult;

pub use device::{SystemBlockDevices, probe_format};
pub use mounts::{SystemMounter, parse_mountinfo};

/// A mount record from the kernel's mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// Mount point.
    pub mount_point: PathBuf,
    /// Device number backing the mount.
    pub device_number: u64,
}

/// Mount table queries and mount/unmount of the volume.
pub trait Mounter: Send + Sync {
    /// Whether `path` is currently a mount point.
    ///
    /// A path that does not exist is not a mount point.
    fn is_mount_point(&self, path: &Path) -> VolshareResult<bool>;

    /// The mount record for `path`.
    ///
    /// Fails with [`VolshareError::NotMounted`](volshare_common::VolshareError::NotMounted)
    /// when nothing is mounted there.
    fn mount_info(&self, path: &Path) -> VolshareResult<MountInfo>;

    /// Mount `device` on `target`, creating a filesystem first if the device has none.
    fn mount(&self, device: &Path, target: &Path) -> VolshareResult<()>;

    /// Unmount `target`.
    ///
    /// A target still in use fails with
    /// [`VolshareError::Busy`](volshare_common::VolshareError::Busy).
    fn unmount(&self, target: &Path) -> VolshareResult<()>;
}

/// Block device inspection and filesystem resize.
pub trait BlockDevices: Send + Sync {
    /// Check that `device` exists and is a block device.
    fn validate_device(&self, device: &Path) -> VolshareResult<()>;

    /// Device number (`st_rdev`) of `device`.
    fn device_number(&self, device: &Path) -> VolshareResult<u64>;

    /// On-disk format of `device`, empty when it carries none.
    fn disk_format(&self, device: &Path) -> VolshareResult<String>;

    /// Grow the filesystem on `device` mounted at `mount_path` to the device size.
    ///
    /// Returns `false` when the filesystem already fills the device.
    fn resize_filesystem(&self, device: &Path, mount_path: &Path) -> VolshareResult<bool>;
}
