//! LUKS mappings managed through `cryptsetup`.

use std::sync::Arc;
use std::time::Duration;

use volshare_common::volume::mapper_name;
use volshare_common::{DataEngine, VolshareError, VolshareResult};

use super::Encryptor;
use crate::exec::CommandRunner;

/// On-disk format reported by `blkid` for a LUKS container.
pub const LUKS_FORMAT: &str = "crypto_LUKS";

/// [`Encryptor`] that drives `cryptsetup`.
pub struct LuksEncryptor {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl LuksEncryptor {
    /// Create an encryptor running `cryptsetup` through `runner`.
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    fn is_open(&self, name: &str) -> VolshareResult<bool> {
        match self
            .runner
            .execute("cryptsetup", &["status", name], self.timeout)
        {
            Ok(_) => Ok(true),
            // cryptsetup reports an inactive mapping with a non-zero exit code.
            Err(VolshareError::Command { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl Encryptor for LuksEncryptor {
    fn resize_encrypted_device(
        &self,
        volume: &str,
        data_engine: DataEngine,
        passphrase: &str,
    ) -> VolshareResult<()> {
        let name = mapper_name(volume, data_engine);

        if !self.is_open(&name)? {
            return Err(VolshareError::InvalidDevice {
                path: name.into(),
                reason: "encrypted mapping is not open".to_string(),
            });
        }

        tracing::info!(mapping = %name, "Resizing encrypted mapping");
        self.runner
            .run("cryptsetup", &["resize", &name], Some(passphrase), self.timeout)?;

        Ok(())
    }
}
