//! NFS export management.
//!
//! This module handles:
//! - Export entries in the NFS-Ganesha configuration file
//! - Reloading the running server after a configuration change
//! - Detecting whether the server process is running

mod ganesha;
mod process;

use volshare_common::VolshareResult;

pub use ganesha::{ExportEntry, GaneshaExporter, parse_exports, render_export};
pub use process::find_processes_by_name;

/// Name of the NFS-Ganesha server process.
pub const GANESHA_PROCESS: &str = "ganesha.nfsd";

/// Publishes a volume's mount point through the NFS server.
pub trait Exporter: Send + Sync {
    /// Add an export for `volume`, returning its export id.
    ///
    /// Adding an export that already exists returns the existing id.
    fn create_export(&self, volume: &str) -> VolshareResult<u16>;

    /// Remove the export of `volume`. Removing a missing export succeeds.
    fn delete_export(&self, volume: &str) -> VolshareResult<()>;

    /// Make the running server pick up the current configuration.
    fn reload(&self) -> VolshareResult<()>;

    /// Whether the NFS server process is running.
    fn server_running(&self) -> bool;
}
