//! The managed volume descriptor.

use std::fmt;
use std::str::FromStr;

use crate::error::{VolshareError, VolshareResult};

/// Backing data engine of a volume.
///
/// The engine selects the naming convention of the encrypted mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataEngine {
    /// The iSCSI/tgt based engine.
    #[default]
    V1,
    /// The SPDK based engine.
    V2,
}

impl DataEngine {
    /// Get the engine as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

impl fmt::Display for DataEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataEngine {
    type Err = VolshareError;

    fn from_str(s: &str) -> VolshareResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "v1" => Ok(Self::V1),
            "v2" => Ok(Self::V2),
            other => Err(VolshareError::Config {
                message: format!("unknown data engine '{other}', expected 'v1' or 'v2'"),
            }),
        }
    }
}

/// The single volume served by a share manager process.
///
/// An empty name means the volume has not been bound yet.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Volume {
    /// Volume name.
    pub name: String,
    /// Backing data engine.
    pub data_engine: DataEngine,
    /// Whether the volume is a LUKS container.
    pub encrypted: bool,
    /// Passphrase of the LUKS container.
    pub passphrase: Option<String>,
}

impl Volume {
    /// Create an unencrypted volume descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, data_engine: DataEngine) -> Self {
        Self {
            name: name.into(),
            data_engine,
            encrypted: false,
            passphrase: None,
        }
    }

    /// Mark the volume as encrypted with the given passphrase.
    #[must_use]
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.encrypted = true;
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Whether the volume has been bound to a name.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        !self.name.is_empty()
    }

    /// Whether the volume is encrypted.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        self.encrypted
    }
}

/// Device-mapper name of an encrypted volume.
#[must_use]
pub fn mapper_name(volume: &str, data_engine: DataEngine) -> String {
    match data_engine {
        DataEngine::V1 => volume.to_string(),
        DataEngine::V2 => format!("{volume}-encrypted"),
    }
}

impl fmt::Debug for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("name", &self.name)
            .field("data_engine", &self.data_engine)
            .field("encrypted", &self.encrypted)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
