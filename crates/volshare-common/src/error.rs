//! Common error types for host adapters.

use std::path::PathBuf;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`VolshareError`].
pub type VolshareResult<T> = Result<T, VolshareError>;

/// Errors reported by the mount, device, encryption and export adapters.
#[derive(Error, Diagnostic, Debug)]
pub enum VolshareError {
    /// The target is in use and the operation may succeed if retried.
    #[error("Target is busy: {}", .target.display())]
    #[diagnostic(
        code(volshare::mount::busy),
        help("Another process still holds files open under the mount point")
    )]
    Busy {
        /// The busy mount point.
        target: PathBuf,
    },

    /// The path is not a mount point.
    #[error("Not a mount point: {}", .path.display())]
    #[diagnostic(code(volshare::mount::not_mounted))]
    NotMounted {
        /// The path that was expected to be mounted.
        path: PathBuf,
    },

    /// The path does not name a usable block device.
    #[error("Invalid block device {}: {reason}", .path.display())]
    #[diagnostic(code(volshare::device::invalid))]
    InvalidDevice {
        /// The device path.
        path: PathBuf,
        /// Why the device was rejected.
        reason: String,
    },

    /// An external command exited unsuccessfully.
    #[error(
        "Command `{command}` failed with exit code {}: {stderr}",
        .exit_code.map_or_else(|| "none".to_string(), |c| c.to_string())
    )]
    #[diagnostic(code(volshare::command::failed))]
    Command {
        /// The command line that was run.
        command: String,
        /// Exit code, absent when the process was killed by a signal.
        exit_code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// An external command did not finish in time.
    #[error("Command `{command}` timed out after {timeout:?}")]
    #[diagnostic(code(volshare::command::timeout))]
    CommandTimeout {
        /// The command line that was run.
        command: String,
        /// The timeout that expired.
        timeout: Duration,
    },

    /// The NFS export configuration could not be updated.
    #[error("Export error: {message}")]
    #[diagnostic(code(volshare::export))]
    Export {
        /// The error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(volshare::io))]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(volshare::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(code(volshare::internal))]
    Internal {
        /// The error message.
        message: String,
    },
}

impl VolshareError {
    /// Whether the error reports a transiently busy target.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}
