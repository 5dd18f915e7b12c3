//! The share lifecycle controller.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use volshare_common::Volume;

use super::error::{ShareError, ShareResult};
use super::state::ShareState;
use crate::config::ShareConfig;
use crate::crypto::{Encryptor, LUKS_FORMAT, LuksEncryptor};
use crate::exec::{CommandRunner, SystemCommandRunner};
use crate::export::{Exporter, GaneshaExporter};
use crate::filesystem::{BlockDevices, Mounter, SystemBlockDevices, SystemMounter};

/// Host adapters used by the controller.
#[derive(Clone)]
pub struct HostAdapters {
    /// Mount table queries and mount/unmount.
    pub mounter: Arc<dyn Mounter>,
    /// Block device inspection and filesystem resize.
    pub devices: Arc<dyn BlockDevices>,
    /// Encrypted mapping resize.
    pub encryptor: Arc<dyn Encryptor>,
    /// NFS export management.
    pub exporter: Arc<dyn Exporter>,
    /// Command runner for `fstrim`.
    pub runner: Arc<dyn CommandRunner>,
}

impl HostAdapters {
    /// Adapters operating on the local host.
    #[must_use]
    pub fn system(config: &ShareConfig) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
        let timeout = config.command_timeout;

        Self {
            mounter: Arc::new(SystemMounter::new(runner.clone(), timeout)),
            devices: Arc::new(SystemBlockDevices::new(runner.clone(), timeout)),
            encryptor: Arc::new(LuksEncryptor::new(runner.clone(), timeout)),
            exporter: Arc::new(
                GaneshaExporter::new(&config.export_config, &config.paths.export_root)
                    .with_proc_root(&config.proc_root)
                    .with_process_name(&config.export_server),
            ),
            runner,
        }
    }
}

/// Serialised, idempotent mount/export lifecycle of the managed volume.
///
/// Every operation holds the controller lock for its whole duration, so no
/// two operations overlap and none observes a half-updated state.
pub struct ShareController {
    volume: Volume,
    config: ShareConfig,
    adapters: HostAdapters,
    state: Mutex<ShareState>,
}

impl ShareController {
    /// Create a controller for `volume`.
    pub fn new(volume: Volume, config: ShareConfig, adapters: HostAdapters) -> Self {
        let state = ShareState::initial(&volume);
        tracing::debug!(?volume, %state, "Created share controller");
        Self {
            volume,
            config,
            adapters,
            state: Mutex::new(state),
        }
    }

    /// Create a controller using the local host adapters.
    pub fn with_system_adapters(volume: Volume, config: ShareConfig) -> Self {
        let adapters = HostAdapters::system(&config);
        Self::new(volume, config, adapters)
    }

    /// The managed volume.
    #[must_use]
    pub const fn volume(&self) -> &Volume {
        &self.volume
    }

    /// Current share state. Waits for an in-flight operation to finish.
    #[must_use]
    pub fn state(&self) -> ShareState {
        *self.state.lock()
    }

    /// Whether the share is mounted and exported.
    #[must_use]
    pub fn share_exported(&self) -> bool {
        self.state().is_exported()
    }

    /// Mount the volume device and export it.
    ///
    /// Skipped when the NFS server is not running or the share is already
    /// exported. A failed export leaves the volume mounted.
    pub fn mount(&self) -> ShareResult<()> {
        let mut state = self.state.lock();
        if *state == ShareState::Unbound {
            tracing::warn!("Volume name is missing");
            return Ok(());
        }

        let name = &self.volume.name;
        if !self.adapters.exporter.server_running() {
            tracing::info!(
                volume = %name,
                "NFS server is not running, skip mounting and exporting volume"
            );
            return Ok(());
        }

        if state.is_exported() {
            return Ok(());
        }

        tracing::info!(volume = %name, "Mounting and exporting volume");
        self.mount_and_export().inspect_err(|e| {
            tracing::error!(volume = %name, error = %e, "Failed to mount and export volume");
        })?;

        *state = ShareState::MountedExported;
        tracing::info!(volume = %name, "Volume is mounted and exported");
        Ok(())
    }

    /// Unexport and unmount the volume.
    ///
    /// The share is marked unexported before any host change is attempted,
    /// so a later [`mount`](Self::mount) always redoes the work.
    pub fn unmount(&self) -> ShareResult<()> {
        let mut state = self.state.lock();
        if *state == ShareState::Unbound {
            tracing::warn!("Volume name is missing");
            return Ok(());
        }

        let name = &self.volume.name;
        if !self.adapters.exporter.server_running() {
            tracing::info!(
                volume = %name,
                "NFS server is not running, skip unexporting and unmounting volume"
            );
            return Ok(());
        }

        *state = ShareState::Unmounted;

        self.unexport_and_unmount().inspect_err(|e| {
            tracing::error!(volume = %name, error = %e, "Failed to unexport and unmount volume");
        })?;

        tracing::info!(volume = %name, "Volume is unexported and unmounted");
        Ok(())
    }

    /// Grow the mounted filesystem, and the encrypted mapping beneath it, to
    /// the size of the volume device.
    pub fn filesystem_resize(&self) -> ShareResult<()> {
        let state = self.state.lock();
        if *state == ShareState::Unbound {
            tracing::warn!("Volume name is missing");
            return Ok(());
        }

        self.resize().inspect_err(|e| {
            tracing::error!(
                volume = %self.volume.name,
                error = %e,
                "Failed to resize mounted filesystem on volume"
            );
        })
    }

    /// Discard unused blocks of the mounted filesystem.
    ///
    /// `encrypted_device` selects whether the filesystem is expected on the
    /// decrypted mapping or on the raw device.
    pub fn filesystem_trim(&self, encrypted_device: bool) -> ShareResult<()> {
        let state = self.state.lock();
        if *state == ShareState::Unbound {
            tracing::warn!("Volume name is missing");
            return Ok(());
        }

        self.trim(encrypted_device).inspect_err(|e| {
            tracing::error!(
                volume = %self.volume.name,
                error = %e,
                "Failed to trim mounted filesystem on volume"
            );
        })
    }

    fn mount_and_export(&self) -> ShareResult<()> {
        let name = &self.volume.name;
        // The decrypted mapping, if any, is opened before the share manager starts.
        let device = self
            .config
            .paths
            .device(name, self.volume.data_engine, false);
        let mount_path = self.config.paths.mount_path(name);

        let mounted = self
            .adapters
            .mounter
            .is_mount_point(&mount_path)
            .map_err(|e| {
                ShareError::internal(
                    format!("failed to check mount point {}", mount_path.display()),
                    e,
                )
            })?;

        if !mounted {
            tracing::info!(volume = %name, device = %device.display(), "Mounting volume");
            self.adapters
                .mounter
                .mount(&device, &mount_path)
                .map_err(|e| ShareError::internal(format!("failed to mount volume {name}"), e))?;
        }

        tracing::info!(volume = %name, "Exporting volume");
        let export_id = self
            .adapters
            .exporter
            .create_export(name)
            .map_err(|e| ShareError::internal("failed to create nfs export", e))?;
        self.adapters
            .exporter
            .reload()
            .map_err(|e| ShareError::internal("failed to reload nfs export", e))?;

        tracing::debug!(volume = %name, export_id, "Export is active");
        Ok(())
    }

    fn unexport_and_unmount(&self) -> ShareResult<()> {
        let name = &self.volume.name;

        tracing::info!(volume = %name, "Unexporting volume");
        self.adapters
            .exporter
            .delete_export(name)
            .map_err(|e| ShareError::internal("failed to delete nfs export", e))?;
        self.adapters
            .exporter
            .reload()
            .map_err(|e| ShareError::internal("failed to reload nfs export", e))?;

        tracing::info!(volume = %name, "Unmounting volume");
        let mount_path = self.config.paths.mount_path(name);
        let attempts = self.config.unmount_retry_count.max(1);
        let mut attempt = 1;
        loop {
            match self.unmount_path(&mount_path) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_busy() && attempt < attempts => {
                    tracing::warn!(
                        volume = %name,
                        attempt,
                        attempts,
                        "Mount point is busy, retrying unmount"
                    );
                    std::thread::sleep(self.config.unmount_retry_interval);
                    attempt += 1;
                }
                Err(e) => {
                    return Err(ShareError::internal(
                        format!("failed to unmount {}", mount_path.display()),
                        e,
                    ));
                }
            }
        }
    }

    fn unmount_path(&self, mount_path: &Path) -> volshare_common::VolshareResult<()> {
        if !self.adapters.mounter.is_mount_point(mount_path)? {
            return Ok(());
        }
        self.adapters.mounter.unmount(mount_path)
    }

    fn resize(&self) -> ShareResult<()> {
        let volume = &self.volume;
        let name = &volume.name;
        let paths = &self.config.paths;

        let device = paths.device(name, volume.data_engine, volume.is_encrypted());
        self.adapters
            .devices
            .validate_device(&device)
            .map_err(|e| ShareError::failed_precondition(format!("volume {name} is not valid: {e}")))?;

        let mount_path = paths.mount_path(name);
        self.adapters
            .mounter
            .mount_info(&mount_path)
            .map_err(|e| ShareError::internal(format!("failed to resolve mount {}", mount_path.display()), e))?;

        tracing::info!(volume = %name, filesystem = %mount_path.display(), "Resizing mounted volume");

        // An online expansion does not reach an already open mapping; an
        // offline one is picked up when the mapping is next opened.
        if volume.is_encrypted() {
            let raw_device = paths.raw_device(name);
            let format = self.adapters.devices.disk_format(&raw_device).map_err(|e| {
                ShareError::internal(format!("failed to determine disk format of volume {name}"), e)
            })?;
            tracing::info!(
                volume = %name,
                mapped_device = %device.display(),
                "Encrypted volume device {} contains filesystem of format {format}",
                raw_device.display()
            );

            if format != LUKS_FORMAT {
                return Err(ShareError::invalid_argument(format!(
                    "unsupported disk encryption format {format}"
                )));
            }

            let passphrase = volume.passphrase.as_deref().ok_or_else(|| {
                ShareError::failed_precondition(format!(
                    "volume {name} is encrypted but has no passphrase"
                ))
            })?;

            self.adapters
                .encryptor
                .resize_encrypted_device(name, volume.data_engine, passphrase)
                .map_err(|e| {
                    ShareError::internal(
                        format!(
                            "failed to resize crypto device {} for volume {name} node expansion",
                            device.display()
                        ),
                        e,
                    )
                })?;
        }

        let resized = self
            .adapters
            .devices
            .resize_filesystem(&device, &mount_path)
            .map_err(|e| ShareError::internal("failed to resize filesystem", e))?;

        if resized {
            tracing::info!(volume = %name, filesystem = %mount_path.display(), "Resized filesystem");
        } else {
            tracing::info!(
                volume = %name,
                filesystem = %mount_path.display(),
                "No resize needed for filesystem"
            );
        }

        Ok(())
    }

    fn trim(&self, encrypted_device: bool) -> ShareResult<()> {
        let name = &self.volume.name;
        let paths = &self.config.paths;

        let device = paths.device(name, self.volume.data_engine, encrypted_device);
        self.adapters
            .devices
            .validate_device(&device)
            .map_err(|e| ShareError::failed_precondition(format!("volume {name} is not valid: {e}")))?;

        let mount_path = paths.mount_path(name);
        let mount = self
            .adapters
            .mounter
            .mount_info(&mount_path)
            .map_err(|e| ShareError::internal(format!("failed to resolve mount {}", mount_path.display()), e))?;

        let device_number = self
            .adapters
            .devices
            .device_number(&device)
            .map_err(|e| ShareError::internal(format!("failed to stat {}", device.display()), e))?;

        if mount.device_number != device_number {
            return Err(ShareError::invalid_argument(format!(
                "the device of mount point {} is not expected",
                mount_path.display()
            )));
        }

        tracing::info!(volume = %name, "Trimming mounted filesystem {}", mount_path.display());

        let is_mount_point = self
            .adapters
            .mounter
            .is_mount_point(&mount_path)
            .map_err(|e| {
                ShareError::internal(
                    format!("failed to check mount point {}", mount_path.display()),
                    e,
                )
            })?;
        if !is_mount_point {
            return Err(ShareError::invalid_argument(format!(
                "{} is not a mount point",
                mount_path.display()
            )));
        }

        std::fs::read_dir(&mount_path).map_err(|e| {
            ShareError::internal(format!("failed to read {}", mount_path.display()), e)
        })?;

        let mount_arg = mount_path.to_string_lossy();
        self.adapters
            .runner
            .execute("fstrim", &[mount_arg.as_ref()], self.config.command_timeout)
            .map_err(|e| ShareError::internal("failed to trim filesystem", e))?;

        tracing::info!(
            volume = %name,
            "Finished trimming mounted filesystem {}",
            mount_path.display()
        );
        Ok(())
    }
}
