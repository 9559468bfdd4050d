//! AEAD: AES-256-GCM

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};

use crate::error::{Error, Result};
use crate::wire::{AES_KEY_BYTES, NONCE_BYTES};

/// AEAD seal (encrypt path). Output is ciphertext || tag.
pub(crate) fn aead_seal(
    key: &[u8; AES_KEY_BYTES],
    nonce: &[u8; NONCE_BYTES],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| Error::KeyDerivation("invalid AES-256 key length".into()))?;
    let n = Nonce::from_slice(nonce);
    cipher
        .encrypt(n, plaintext)
        .map_err(|_| Error::KeyDerivation("AES-GCM encryption rejected its input".into()))
}

/// AEAD open (decrypt path). Any authentication failure is `AeadFailure`.
pub(crate) fn aead_open(
    key: &[u8; AES_KEY_BYTES],
    nonce: &[u8; NONCE_BYTES],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| Error::AeadFailure)?;
    let n = Nonce::from_slice(nonce);
    cipher.decrypt(n, ciphertext).map_err(|_| Error::AeadFailure)
}
