//! Mount operations.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustix::io::Errno;
use volshare_common::{VolshareError, VolshareResult};

use super::{MountInfo, Mounter, probe_format};
use crate::exec::CommandRunner;

/// Kernel mount table of the current mount namespace.
const PROC_MOUNTINFO: &str = "/proc/self/mountinfo";

/// Filesystem created on a blank volume device.
const DEFAULT_FSTYPE: &str = "ext4";

/// [`Mounter`] backed by the kernel mount table and `mount(2)`.
pub struct SystemMounter {
    mountinfo: PathBuf,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl SystemMounter {
    /// Create a mounter that formats blank devices through `runner`.
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self {
            mountinfo: PathBuf::from(PROC_MOUNTINFO),
            runner,
            timeout,
        }
    }

    #[cfg(test)]
    fn with_mountinfo(mut self, mountinfo: impl Into<PathBuf>) -> Self {
        self.mountinfo = mountinfo.into();
        self
    }

    fn mounts(&self) -> VolshareResult<Vec<MountInfo>> {
        let content = std::fs::read_to_string(&self.mountinfo)?;
        Ok(parse_mountinfo(&content))
    }

    /// Resolve symlinks so the path compares equal to the kernel's record.
    fn resolve(path: &Path) -> VolshareResult<Option<PathBuf>> {
        match std::fs::canonicalize(path) {
            Ok(resolved) => Ok(Some(resolved)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn format(&self, device: &Path) -> VolshareResult<String> {
        let existing = probe_format(self.runner.as_ref(), device, self.timeout)?;
        if !existing.is_empty() {
            return Ok(existing);
        }

        tracing::info!(device = %device.display(), fstype = DEFAULT_FSTYPE, "Formatting blank device");
        let device_arg = device.to_string_lossy();
        self.runner.execute(
            &format!("mkfs.{DEFAULT_FSTYPE}"),
            &["-F", device_arg.as_ref()],
            self.timeout,
        )?;
        Ok(DEFAULT_FSTYPE.to_string())
    }
}

impl Mounter for SystemMounter {
    fn is_mount_point(&self, path: &Path) -> VolshareResult<bool> {
        let Some(resolved) = Self::resolve(path)? else {
            return Ok(false);
        };
        Ok(self.mounts()?.iter().any(|m| m.mount_point == resolved))
    }

    fn mount_info(&self, path: &Path) -> VolshareResult<MountInfo> {
        let not_mounted = || VolshareError::NotMounted {
            path: path.to_path_buf(),
        };
        let resolved = Self::resolve(path)?.ok_or_else(not_mounted)?;

        // The last record wins when mounts are stacked on the same path.
        self.mounts()?
            .into_iter()
            .rev()
            .find(|m| m.mount_point == resolved)
            .ok_or_else(not_mounted)
    }

    fn mount(&self, device: &Path, target: &Path) -> VolshareResult<()> {
        use rustix::mount::{MountFlags, mount};

        std::fs::create_dir_all(target)?;

        let fstype = self.format(device)?;
        if fstype.contains(' ') {
            return Err(VolshareError::InvalidDevice {
                path: device.to_path_buf(),
                reason: format!("refusing to mount device holding {fstype}"),
            });
        }

        tracing::debug!(
            device = %device.display(),
            target = %target.display(),
            fstype = %fstype,
            "Mounting filesystem"
        );

        mount(
            device,
            target,
            fstype.as_str(),
            MountFlags::empty(),
            None::<&std::ffi::CStr>,
        )
        .map_err(|e| mount_error(e, target))
    }

    fn unmount(&self, target: &Path) -> VolshareResult<()> {
        use rustix::mount::{UnmountFlags, unmount};

        tracing::debug!(target = %target.display(), "Unmounting filesystem");

        unmount(target, UnmountFlags::empty()).map_err(|e| match e {
            Errno::INVAL => VolshareError::NotMounted {
                path: target.to_path_buf(),
            },
            other => mount_error(other, target),
        })
    }
}

fn mount_error(errno: Errno, target: &Path) -> VolshareError {
    match errno {
        Errno::BUSY => VolshareError::Busy {
            target: target.to_path_buf(),
        },
        other => VolshareError::Io(other.into()),
    }
}

/// Parse the contents of a `mountinfo` file.
///
/// Malformed lines are skipped.
pub fn parse_mountinfo(content: &str) -> Vec<MountInfo> {
    content.lines().filter_map(parse_mountinfo_line).collect()
}

// 36 35 98:0 /mnt1 /mnt2 rw,noatime master:1 - ext3 /dev/root rw,errors=continue
fn parse_mountinfo_line(line: &str) -> Option<MountInfo> {
    let (mount_fields, fs_fields) = line.split_once(" - ")?;

    let mut fields = mount_fields.split_whitespace();
    let _mount_id = fields.next()?;
    let _parent_id = fields.next()?;
    let (major, minor) = fields.next()?.split_once(':')?;
    let _root = fields.next()?;
    let mount_point = fields.next()?;

    // Records without a filesystem type are malformed.
    fs_fields.split_whitespace().next()?;

    Some(MountInfo {
        mount_point: PathBuf::from(unescape(mount_point)),
        device_number: rustix::fs::makedev(major.parse().ok()?, minor.parse().ok()?),
    })
}

/// Undo the kernel's octal escaping of space, tab, newline and backslash.
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let octal = std::str::from_utf8(&bytes[i + 1..i + 4]).unwrap_or_default();
            if let Ok(value) = u8::from_str_radix(octal, 8) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::SystemCommandRunner;
    use crate::exec::testing::ScriptedRunner;

    const SAMPLE: &str = "\
22 1 259:2 / / rw,relatime shared:1 - ext4 /dev/nvme0n1p2 rw
36 22 8:16 / /export/pvc-1 rw,relatime shared:12 - ext4 /dev/longhorn/pvc-1 rw
37 22 8:32 / /export/with\\040space rw - xfs /dev/sdc rw
garbage line
";

    #[test]
    fn parses_records() {
        let mounts = parse_mountinfo(SAMPLE);
        assert_eq!(mounts.len(), 3);
        assert_eq!(mounts[1].mount_point, PathBuf::from("/export/pvc-1"));
        assert_eq!(mounts[1].device_number, rustix::fs::makedev(8, 16));
    }

    #[test]
    fn unescapes_mount_points() {
        let mounts = parse_mountinfo(SAMPLE);
        assert_eq!(mounts[2].mount_point, PathBuf::from("/export/with space"));
        assert_eq!(unescape("a\\134b"), "a\\b");
        assert_eq!(unescape("trailing\\04"), "trailing\\04");
    }

    #[test]
    fn queries_a_custom_mount_table() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("pvc-1");
        std::fs::create_dir_all(&target).unwrap();
        let resolved = std::fs::canonicalize(&target).unwrap();

        let table = dir.path().join("mountinfo");
        std::fs::write(
            &table,
            format!(
                "40 22 8:16 / {} rw - ext4 /dev/sdb rw\n",
                resolved.display()
            ),
        )
        .unwrap();

        let mounter = SystemMounter::new(Arc::new(SystemCommandRunner), Duration::from_secs(5))
            .with_mountinfo(&table);

        assert!(mounter.is_mount_point(&target).unwrap());
        assert!(!mounter.is_mount_point(dir.path()).unwrap());
        assert!(!mounter.is_mount_point(&dir.path().join("missing")).unwrap());

        let info = mounter.mount_info(&target).unwrap();
        assert_eq!(info.device_number, rustix::fs::makedev(8, 16));
        assert!(matches!(
            mounter.mount_info(dir.path()),
            Err(VolshareError::NotMounted { .. })
        ));
    }

    #[test]
    fn failed_mount_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("missing-device");
        let target = dir.path().join("mnt").join("pvc-1");
        let runner = Arc::new(ScriptedRunner::default().with("blkid", Ok("TYPE=ext4\n")));

        let mounter = SystemMounter::new(runner.clone(), Duration::from_secs(5));
        let err = mounter.mount(&device, &target).unwrap_err();

        assert!(matches!(err, VolshareError::Io(_)), "{err:?}");
        assert!(target.is_dir());
        assert!(runner.called("blkid"));
        assert!(!runner.called("mkfs"));
    }

    #[test]
    fn refuses_partitioned_device() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::default().with("blkid", Ok("PTTYPE=gpt\n")));

        let mounter = SystemMounter::new(runner, Duration::from_secs(5));
        let err = mounter
            .mount(&dir.path().join("sdb"), &dir.path().join("mnt"))
            .unwrap_err();

        assert!(matches!(err, VolshareError::InvalidDevice { .. }), "{err:?}");
    }

    #[test]
    fn busy_errno_is_typed() {
        let target = Path::new("/export/pvc-1");

        assert!(mount_error(Errno::BUSY, target).is_busy());
        assert!(matches!(
            mount_error(Errno::PERM, target),
            VolshareError::Io(e) if e.raw_os_error() == Some(libc::EPERM)
        ));
    }
}
