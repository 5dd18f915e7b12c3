//! Share lifecycle control.
//!
//! The [`ShareController`] serialises mount, unmount, resize and trim of the
//! managed volume behind one lock and tracks whether the share is exported.

mod controller;
mod error;
mod state;

pub use controller::{HostAdapters, ShareController};
pub use error::{ShareError, ShareResult};
pub use state::ShareState;
