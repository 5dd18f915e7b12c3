//! In-memory host used by the share controller tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;
use volshare::config::ShareConfig;
use volshare::crypto::Encryptor;
use volshare::exec::CommandRunner;
use volshare::export::Exporter;
use volshare::filesystem::{BlockDevices, MountInfo, Mounter};
use volshare::share::{HostAdapters, ShareController};
use volshare_common::{DataEngine, SharePaths, Volume, VolshareError, VolshareResult};

/// How the fake answers unmount requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmountBehavior {
    Succeed,
    AlwaysBusy,
    Fail,
}

/// Mutable host state behind the fake adapters.
#[derive(Debug)]
pub struct HostState {
    pub server_running: bool,
    pub mounted: bool,
    pub exports: Vec<String>,
    pub unmount: UnmountBehavior,
    pub fail_delete_export: bool,
    pub fail_create_export: bool,
    pub fail_reload: bool,
    pub fail_mount: bool,
    pub fail_validate: bool,
    /// Answer mount point queries with this instead of the mount flag.
    pub mount_point_override: Option<bool>,
    pub mount_delay: Duration,
    pub mount_device_number: u64,
    pub device_number: u64,
    pub disk_format: String,
}

impl Default for HostState {
    fn default() -> Self {
        Self {
            server_running: true,
            mounted: false,
            exports: Vec::new(),
            unmount: UnmountBehavior::Succeed,
            fail_delete_export: false,
            fail_create_export: false,
            fail_reload: false,
            fail_mount: false,
            fail_validate: false,
            mount_point_override: None,
            mount_delay: Duration::ZERO,
            mount_device_number: 0x0803,
            device_number: 0x0803,
            disk_format: "crypto_LUKS".to_string(),
        }
    }
}

/// Fake host recording every adapter call in order.
#[derive(Debug, Default)]
pub struct FakeHost {
    pub state: Mutex<HostState>,
    calls: Mutex<Vec<String>>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.starts_with(name)).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.calls.lock().iter().position(|c| c.starts_with(name))
    }

    pub fn adapters(self: &Arc<Self>) -> HostAdapters {
        HostAdapters {
            mounter: self.clone(),
            devices: self.clone(),
            encryptor: self.clone(),
            exporter: self.clone(),
            runner: self.clone(),
        }
    }
}

impl Mounter for FakeHost {
    fn is_mount_point(&self, path: &Path) -> VolshareResult<bool> {
        self.record(format!("is_mount_point {}", path.display()));
        let state = self.state.lock();
        Ok(state.mount_point_override.unwrap_or(state.mounted))
    }

    fn mount_info(&self, path: &Path) -> VolshareResult<MountInfo> {
        self.record(format!("mount_info {}", path.display()));
        let state = self.state.lock();
        if !state.mounted {
            return Err(VolshareError::NotMounted {
                path: path.to_path_buf(),
            });
        }
        Ok(MountInfo {
            mount_point: path.to_path_buf(),
            device_number: state.mount_device_number,
        })
    }

    fn mount(&self, device: &Path, target: &Path) -> VolshareResult<()> {
        self.record(format!("mount {} {}", device.display(), target.display()));
        let (delay, fail) = {
            let state = self.state.lock();
            (state.mount_delay, state.fail_mount)
        };
        std::thread::sleep(delay);
        if fail {
            return Err(VolshareError::Io(std::io::Error::other(
                "wrong fs type, bad superblock",
            )));
        }
        self.state.lock().mounted = true;
        self.record("mount done");
        Ok(())
    }

    fn unmount(&self, target: &Path) -> VolshareResult<()> {
        self.record(format!("unmount {}", target.display()));
        let mut state = self.state.lock();
        match state.unmount {
            UnmountBehavior::Succeed => {
                state.mounted = false;
                Ok(())
            }
            UnmountBehavior::AlwaysBusy => Err(VolshareError::Busy {
                target: target.to_path_buf(),
            }),
            UnmountBehavior::Fail => Err(VolshareError::Internal {
                message: "Permission denied".to_string(),
            }),
        }
    }
}

impl BlockDevices for FakeHost {
    fn validate_device(&self, device: &Path) -> VolshareResult<()> {
        self.record(format!("validate_device {}", device.display()));
        if self.state.lock().fail_validate {
            return Err(VolshareError::InvalidDevice {
                path: device.to_path_buf(),
                reason: "not a block device".to_string(),
            });
        }
        Ok(())
    }

    fn device_number(&self, device: &Path) -> VolshareResult<u64> {
        self.record(format!("device_number {}", device.display()));
        Ok(self.state.lock().device_number)
    }

    fn disk_format(&self, device: &Path) -> VolshareResult<String> {
        self.record(format!("disk_format {}", device.display()));
        Ok(self.state.lock().disk_format.clone())
    }

    fn resize_filesystem(&self, device: &Path, mount_path: &Path) -> VolshareResult<bool> {
        self.record(format!(
            "resize_filesystem {} {}",
            device.display(),
            mount_path.display()
        ));
        Ok(true)
    }
}

impl Encryptor for FakeHost {
    fn resize_encrypted_device(
        &self,
        volume: &str,
        data_engine: DataEngine,
        _passphrase: &str,
    ) -> VolshareResult<()> {
        self.record(format!("resize_encrypted_device {volume} {data_engine}"));
        Ok(())
    }
}

impl Exporter for FakeHost {
    fn create_export(&self, volume: &str) -> VolshareResult<u16> {
        self.record(format!("create_export {volume}"));
        let mut state = self.state.lock();
        if state.fail_create_export {
            return Err(VolshareError::Export {
                message: "configuration file is read-only".to_string(),
            });
        }
        if let Some(i) = state.exports.iter().position(|v| v == volume) {
            return Ok(u16::try_from(i + 1).unwrap_or(u16::MAX));
        }
        state.exports.push(volume.to_string());
        Ok(u16::try_from(state.exports.len()).unwrap_or(u16::MAX))
    }

    fn delete_export(&self, volume: &str) -> VolshareResult<()> {
        self.record(format!("delete_export {volume}"));
        let mut state = self.state.lock();
        if state.fail_delete_export {
            return Err(VolshareError::Export {
                message: "configuration file is read-only".to_string(),
            });
        }
        state.exports.retain(|v| v != volume);
        Ok(())
    }

    fn reload(&self) -> VolshareResult<()> {
        self.record("reload");
        if self.state.lock().fail_reload {
            return Err(VolshareError::Export {
                message: "ganesha.nfsd is not running".to_string(),
            });
        }
        Ok(())
    }

    fn server_running(&self) -> bool {
        self.record("server_running");
        self.state.lock().server_running
    }
}

impl CommandRunner for FakeHost {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        _stdin: Option<&str>,
        _timeout: Duration,
    ) -> VolshareResult<String> {
        self.record(format!("run {program} {}", args.join(" ")));
        Ok(String::new())
    }
}

/// A controller over a fake host with paths below a scratch directory.
pub struct Fixture {
    pub host: Arc<FakeHost>,
    pub controller: Arc<ShareController>,
    pub config: ShareConfig,
    _root: TempDir,
}

impl Fixture {
    pub fn new(volume: Volume) -> Self {
        Self::with_config(volume, |config| config)
    }

    pub fn with_config(volume: Volume, tweak: impl FnOnce(ShareConfig) -> ShareConfig) -> Self {
        let root = TempDir::new().unwrap();
        let config = tweak(
            ShareConfig::default()
                .with_paths(SharePaths::with_root(root.path()))
                .with_unmount_retry(30, Duration::from_millis(1)),
        );
        if volume.is_bound() {
            std::fs::create_dir_all(config.paths.mount_path(&volume.name)).unwrap();
        }

        let host = FakeHost::new();
        let controller = Arc::new(ShareController::new(
            volume,
            config.clone(),
            host.adapters(),
        ));
        Self {
            host,
            controller,
            config,
            _root: root,
        }
    }
}

pub fn volume() -> Volume {
    Volume::new("pvc-1", DataEngine::V1)
}
