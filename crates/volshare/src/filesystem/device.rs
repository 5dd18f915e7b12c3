//! Block device inspection and live filesystem resize.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use volshare_common::{VolshareError, VolshareResult};

use super::BlockDevices;
use crate::exec::CommandRunner;

/// `blkid` exit code when the device carries no recognised signature.
const BLKID_NOTHING_FOUND: i32 = 2;

/// Detect the on-disk format of `device` with `blkid`.
///
/// Returns an empty string for a blank device. A device holding only a
/// partition table reports `"<type> partition table"`.
pub fn probe_format(
    runner: &dyn CommandRunner,
    device: &Path,
    timeout: Duration,
) -> VolshareResult<String> {
    let device_arg = device.to_string_lossy();
    let output = match runner.execute(
        "blkid",
        &["-p", "-s", "TYPE", "-s", "PTTYPE", "-o", "export", device_arg.as_ref()],
        timeout,
    ) {
        Ok(output) => output,
        Err(VolshareError::Command {
            exit_code: Some(BLKID_NOTHING_FOUND),
            ..
        }) => return Ok(String::new()),
        Err(e) => return Err(e),
    };

    Ok(parse_blkid_export(&output))
}

fn parse_blkid_export(output: &str) -> String {
    let mut fstype = None;
    let mut pttype = None;
    for line in output.lines() {
        match line.trim().split_once('=') {
            Some(("TYPE", value)) => fstype = Some(value.to_string()),
            Some(("PTTYPE", value)) => pttype = Some(value.to_string()),
            _ => {}
        }
    }

    match (fstype, pttype) {
        (Some(fstype), _) => fstype,
        (None, Some(pttype)) => format!("{pttype} partition table"),
        (None, None) => String::new(),
    }
}

/// [`BlockDevices`] backed by `stat(2)` and the e2fsprogs/xfsprogs tools.
pub struct SystemBlockDevices {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl SystemBlockDevices {
    /// Create a device inspector running tools through `runner`.
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    fn run(&self, program: &str, args: &[&str]) -> VolshareResult<String> {
        self.runner.execute(program, args, self.timeout)
    }

    fn device_size(&self, device: &Path) -> VolshareResult<u64> {
        let device_arg = device.to_string_lossy();
        let output = self.run("blockdev", &["--getsize64", device_arg.as_ref()])?;
        output.trim().parse().map_err(|e| VolshareError::Internal {
            message: format!("Unexpected blockdev output {output:?}: {e}"),
        })
    }

    /// Size of an ext filesystem as `(block size, total bytes)`.
    fn ext_size(&self, device: &Path) -> VolshareResult<(u64, u64)> {
        let output = self.run("dumpe2fs", &["-h", device.to_string_lossy().as_ref()])?;
        parse_dumpe2fs(&output).ok_or_else(|| VolshareError::Internal {
            message: format!("Failed to read ext filesystem size of {}", device.display()),
        })
    }

    /// Size of a mounted xfs filesystem as `(block size, total bytes)`.
    fn xfs_size(&self, mount_path: &Path) -> VolshareResult<(u64, u64)> {
        let mount_arg = mount_path.to_string_lossy();
        let output = self.run("xfs_io", &["-c", "statfs", mount_arg.as_ref()])?;
        parse_xfs_statfs(&output).ok_or_else(|| VolshareError::Internal {
            message: format!(
                "Failed to read xfs filesystem size of {}",
                mount_path.display()
            ),
        })
    }
}

impl BlockDevices for SystemBlockDevices {
    fn validate_device(&self, device: &Path) -> VolshareResult<()> {
        use rustix::fs::{FileType, stat};

        let invalid = |reason: String| VolshareError::InvalidDevice {
            path: device.to_path_buf(),
            reason,
        };

        let st = stat(device).map_err(|e| invalid(e.to_string()))?;
        match FileType::from_raw_mode(st.st_mode) {
            FileType::BlockDevice => Ok(()),
            other => Err(invalid(format!("expected a block device, found {other:?}"))),
        }
    }

    fn device_number(&self, device: &Path) -> VolshareResult<u64> {
        let st = rustix::fs::stat(device).map_err(|e| VolshareError::Io(e.into()))?;
        #[allow(clippy::useless_conversion)]
        let rdev = u64::from(st.st_rdev);
        Ok(rdev)
    }

    fn disk_format(&self, device: &Path) -> VolshareResult<String> {
        probe_format(self.runner.as_ref(), device, self.timeout)
    }

    fn resize_filesystem(&self, device: &Path, mount_path: &Path) -> VolshareResult<bool> {
        let format = self.disk_format(device)?;
        let device_size = self.device_size(device)?;

        let (block_size, fs_size) = match format.as_str() {
            "ext2" | "ext3" | "ext4" => self.ext_size(device)?,
            "xfs" => self.xfs_size(mount_path)?,
            other => {
                return Err(VolshareError::Internal {
                    message: format!(
                        "Resize of filesystem format {other:?} on {} is not supported",
                        device.display()
                    ),
                });
            }
        };

        tracing::debug!(
            device = %device.display(),
            device_size,
            fs_size,
            block_size,
            "Comparing filesystem and device size"
        );

        if device_size.saturating_sub(fs_size) <= block_size {
            return Ok(false);
        }

        if format == "xfs" {
            self.run("xfs_growfs", &[mount_path.to_string_lossy().as_ref()])?;
        } else {
            self.run("resize2fs", &[device.to_string_lossy().as_ref()])?;
        }

        Ok(true)
    }
}

fn parse_dumpe2fs(output: &str) -> Option<(u64, u64)> {
    let mut block_size = None;
    let mut block_count = None;
    for line in output.lines() {
        if let Some((key, value)) = line.split_once(':') {
            match key.trim() {
                "Block size" => block_size = value.trim().parse::<u64>().ok(),
                "Block count" => block_count = value.trim().parse::<u64>().ok(),
                _ => {}
            }
        }
    }
    let block_size = block_size?;
    Some((block_size, block_size.checked_mul(block_count?)?))
}

fn parse_xfs_statfs(output: &str) -> Option<(u64, u64)> {
    let mut block_size = None;
    let mut data_blocks = None;
    for line in output.lines() {
        if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "geom.bsize" => block_size = value.trim().parse::<u64>().ok(),
                "geom.datablocks" => data_blocks = value.trim().parse::<u64>().ok(),
                _ => {}
            }
        }
    }
    let block_size = block_size?;
    Some((block_size, block_size.checked_mul(data_blocks?)?))
}
