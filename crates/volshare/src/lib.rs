//! # Volshare
//!
//! Exports a single block volume over NFS and keeps its mount and export
//! lifecycle consistent.
//!
//! ## Features
//!
//! - **Serialised lifecycle**: mount, unmount, resize and trim run one at a time
//! - **Idempotent operations**: repeating a request is always safe
//! - **NFS-Ganesha exports**: export entries and server reload
//! - **Encrypted volumes**: online resize of LUKS mappings
//!
//! ## Usage
//!
//! ```no_run
//! use volshare::config::ShareConfig;
//! use volshare::share::ShareController;
//! use volshare_common::{DataEngine, Volume};
//!
//! # fn example() -> volshare::share::ShareResult<()> {
//! let volume = Volume::new("pvc-1234", DataEngine::V1);
//! let controller = ShareController::with_system_adapters(volume, ShareConfig::default());
//!
//! controller.mount()?;
//! assert!(controller.share_exported());
//! controller.unmount()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod crypto;
pub mod exec;
pub mod export;
pub mod filesystem;
pub mod health;
pub mod share;

pub use config::ShareConfig;
pub use health::{HealthReporter, ServingStatus};
pub use share::{ShareController, ShareError, ShareResult};
