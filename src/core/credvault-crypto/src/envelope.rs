//! Context-bound envelope encryption.
//!
//! Every credential is sealed under its own key, derived from the master key
//! with HKDF-SHA256 using the credential context as `info`. The same context
//! is passed to AES-256-GCM as associated data, so a blob copied under a
//! different credential id fails authentication.
//!
//! Blob layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::master_key::MasterKey;

/// GCM nonce length.
pub const NONCE_LEN: usize = 12;

/// GCM tag length.
pub const TAG_LEN: usize = 16;

const INFO_PREFIX: &[u8] = b"credvault-envelope-v1:";

fn derive_cipher(master: &MasterKey, context: &str) -> Result<Aes256Gcm, CryptoError> {
    let hkdf = Hkdf::<Sha256>::new(None, master.as_bytes());

    let mut info = Vec::with_capacity(INFO_PREFIX.len() + context.len());
    info.extend_from_slice(INFO_PREFIX);
    info.extend_from_slice(context.as_bytes());

    let mut okm = Zeroizing::new([0u8; 32]);
    hkdf.expand(&info, &mut okm[..])
        .map_err(|e| CryptoError::Derivation(e.to_string()))?;

    Aes256Gcm::new_from_slice(&okm[..]).map_err(|e| CryptoError::Derivation(e.to_string()))
}

/// Encrypts `plaintext` under a key derived for `context`.
pub fn seal(master: &MasterKey, context: &str, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = derive_cipher(master, context)?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let sealed = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: context.as_bytes(),
            },
        )
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&sealed);
    Ok(blob)
}

/// Decrypts a blob produced by [`seal`] for the same `context`.
pub fn open(
    master: &MasterKey,
    context: &str,
    blob: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::Decryption("envelope too short".into()));
    }

    let cipher = derive_cipher(master, context)?;
    let (nonce, sealed) = blob.split_at(NONCE_LEN);

    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: sealed,
                aad: context.as_bytes(),
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::Decryption("authentication failed".into()))
}
