//! # volshare-common
//!
//! Shared types for the volshare share manager.
//!
//! This crate provides common functionality used across all volshare crates:
//! - The managed volume descriptor and its data-engine kind
//! - Device and mount path conventions
//! - The error type reported by host adapters

#![warn(missing_docs)]

pub mod error;
pub mod paths;
pub mod volume;

pub use error::{VolshareError, VolshareResult};
pub use paths::SharePaths;
pub use volume::{DataEngine, Volume};
