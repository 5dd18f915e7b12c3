//! Encrypted volume support.
//!
//! Only the online resize of an already open LUKS mapping is handled here.
//! Opening and closing the mapping happens before the share manager starts.

mod luks;

use volshare_common::{DataEngine, VolshareResult};

pub use luks::{LUKS_FORMAT, LuksEncryptor};

/// Operations on the decrypted mapping of an encrypted volume.
pub trait Encryptor: Send + Sync {
    /// Grow the open mapping of `volume` to the size of its backing device.
    fn resize_encrypted_device(
        &self,
        volume: &str,
        data_engine: DataEngine,
        passphrase: &str,
    ) -> VolshareResult<()>;
}
