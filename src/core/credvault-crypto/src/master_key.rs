//! Store master key.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

/// Length of a master key in bytes.
pub const MASTER_KEY_LEN: usize = 32;

/// Root secret from which every credential encryption key is derived.
///
/// The bytes are wiped on drop and never printed by `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: [u8; MASTER_KEY_LEN],
}

impl MasterKey {
    /// Generates a fresh random key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; MASTER_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Builds a key from exactly [`MASTER_KEY_LEN`] raw bytes.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; MASTER_KEY_LEN] = raw.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "expected {MASTER_KEY_LEN} bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Parses a standard base64 encoded key, as passed through
    /// `CREDVAULT_MASTER_KEY`.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let raw = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|e| CryptoError::InvalidKey(format!("not valid base64: {e}")))?,
        );
        Self::from_bytes(&raw)
    }

    /// Encodes the key as standard base64.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    #[inline]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}
