//! Share state machine.

use std::fmt;

use volshare_common::Volume;

/// Lifecycle state of the managed volume's share.
///
/// ```text
///             mount                 unmount
/// Unmounted ---------> MountedExported ---------> Unmounted
/// ```
///
/// `Unbound` is fixed at construction for a volume without a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShareState {
    /// No volume has been bound to this process.
    Unbound,
    /// The share is not known to be mounted and exported.
    Unmounted,
    /// The volume is mounted and exported.
    MountedExported,
}

impl ShareState {
    /// Initial state for `volume`. Nothing is assumed about the host.
    #[must_use]
    pub fn initial(volume: &Volume) -> Self {
        if volume.is_bound() {
            Self::Unmounted
        } else {
            Self::Unbound
        }
    }

    /// Whether the share is exported.
    #[must_use]
    pub const fn is_exported(self) -> bool {
        matches!(self, Self::MountedExported)
    }

    /// Get the state as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unbound => "unbound",
            Self::Unmounted => "unmounted",
            Self::MountedExported => "mounted-exported",
        }
    }
}

impl fmt::Display for ShareState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
