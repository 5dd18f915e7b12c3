//! Share manager configuration.

use std::path::PathBuf;
use std::time::Duration;

use volshare_common::SharePaths;

use crate::export::GANESHA_PROCESS;
use crate::health::MIN_WATCH_INTERVAL;

/// Default location of the Ganesha export configuration.
pub const DEFAULT_EXPORT_CONFIG: &str = "/tmp/vfs.conf";

/// Share manager configuration options.
#[derive(Debug, Clone)]
pub struct ShareConfig {
    /// Device and mount path conventions.
    pub paths: SharePaths,
    /// Ganesha export configuration file.
    pub export_config: PathBuf,
    /// Process name of the NFS server.
    pub export_server: String,
    /// procfs mount used to find the NFS server.
    pub proc_root: PathBuf,
    /// Number of unmount attempts while the mount point is busy.
    pub unmount_retry_count: u32,
    /// Delay between busy unmount attempts.
    pub unmount_retry_interval: Duration,
    /// Timeout of external commands such as `fstrim`.
    pub command_timeout: Duration,
    /// Interval between health watch updates.
    pub health_watch_interval: Duration,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            paths: SharePaths::new(),
            export_config: PathBuf::from(DEFAULT_EXPORT_CONFIG),
            export_server: GANESHA_PROCESS.to_string(),
            proc_root: PathBuf::from("/proc"),
            unmount_retry_count: 30,
            unmount_retry_interval: Duration::from_secs(1),
            command_timeout: Duration::from_secs(60),
            health_watch_interval: Duration::from_secs(1),
        }
    }
}

impl ShareConfig {
    /// Set the path conventions.
    #[must_use]
    pub fn with_paths(mut self, paths: SharePaths) -> Self {
        self.paths = paths;
        self
    }

    /// Set the Ganesha export configuration file.
    #[must_use]
    pub fn with_export_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_config = path.into();
        self
    }

    /// Set the NFS server process name.
    #[must_use]
    pub fn with_export_server(mut self, name: impl Into<String>) -> Self {
        self.export_server = name.into();
        self
    }

    /// Set the procfs root.
    #[must_use]
    pub fn with_proc_root(mut self, proc_root: impl Into<PathBuf>) -> Self {
        self.proc_root = proc_root.into();
        self
    }

    /// Set the busy unmount retry policy.
    #[must_use]
    pub fn with_unmount_retry(mut self, count: u32, interval: Duration) -> Self {
        self.unmount_retry_count = count;
        self.unmount_retry_interval = interval;
        self
    }

    /// Set the external command timeout.
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the health watch interval, no shorter than [`MIN_WATCH_INTERVAL`].
    #[must_use]
    pub fn with_health_watch_interval(mut self, interval: Duration) -> Self {
        self.health_watch_interval = interval.max(MIN_WATCH_INTERVAL);
        self
    }
}
