//! Key Derivation Unit
//!
//! key = HKDF-SHA256(ikm = prf_output, salt, info = HKDF_INFO, len = 32)
//!
//! salt = 32 zero bytes for v1 envelopes, the envelope's random 16-byte
//! `hkdfSalt` for v2 and v3. `HKDF_INFO` is shared by every version; changing
//! it requires a new envelope version.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::aead;
use crate::error::{Error, Result};
use crate::wire::{AES_KEY_BYTES, HKDF_SALT_BYTES, LEGACY_SALT_BYTES, NONCE_BYTES};

/// Context string for domain separation of every derived key.
pub const HKDF_INFO: &[u8] = b"pitch-webauthn-encryption";

/// The constant salt used by v1 envelopes.
pub const LEGACY_ZERO_SALT: [u8; LEGACY_SALT_BYTES] = [0u8; LEGACY_SALT_BYTES];

// ---------------------------------------------------------------------------
// Key material (PRF output)
// ---------------------------------------------------------------------------

/// Raw PRF output returned by an assertion. Zeroized on drop.
#[derive(Clone)]
pub struct KeyMaterial(Zeroizing<Vec<u8>>);

impl KeyMaterial {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(bytes.into()))
    }

    /// Parse the base64 form callers pass between the assertion and the router.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::KeyDerivation(format!("key material is not valid base64: {e}")))?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(self.0.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("len", &self.0.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Salt selection
// ---------------------------------------------------------------------------

/// HKDF salt for one derivation.
#[derive(Debug, Clone, Copy)]
pub enum KeySalt<'a> {
    /// v1: fixed all-zero salt. Decrypt-only; never used for new envelopes.
    LegacyZero,
    /// v2/v3: per-envelope random salt.
    Explicit(&'a [u8]),
}

impl KeySalt<'_> {
    fn bytes(&self) -> Result<&[u8]> {
        match self {
            KeySalt::LegacyZero => Ok(&LEGACY_ZERO_SALT[..]),
            KeySalt::Explicit(salt) if salt.len() == HKDF_SALT_BYTES => Ok(*salt),
            KeySalt::Explicit(salt) => Err(Error::KeyDerivation(format!(
                "hkdf salt must be {} bytes, got {}",
                HKDF_SALT_BYTES,
                salt.len()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Single-purpose derived keys
// ---------------------------------------------------------------------------

/// AES-256-GCM key that can only encrypt. Consumed by [`SealingKey::seal`].
pub struct SealingKey {
    key: Zeroizing<[u8; AES_KEY_BYTES]>,
}

impl SealingKey {
    pub(crate) fn seal(self, nonce: &[u8; NONCE_BYTES], plaintext: &[u8]) -> Result<Vec<u8>> {
        aead::aead_seal(&self.key, nonce, plaintext)
    }
}

/// AES-256-GCM key that can only decrypt. Consumed by [`OpeningKey::open`].
pub struct OpeningKey {
    key: Zeroizing<[u8; AES_KEY_BYTES]>,
}

impl OpeningKey {
    pub(crate) fn open(
        self,
        nonce: &[u8; NONCE_BYTES],
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        aead::aead_open(&self.key, nonce, ciphertext).map(Zeroizing::new)
    }
}

impl fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SealingKey([REDACTED])")
    }
}

impl fmt::Debug for OpeningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OpeningKey([REDACTED])")
    }
}

fn derive_key(material: &KeyMaterial, salt: KeySalt<'_>) -> Result<Zeroizing<[u8; AES_KEY_BYTES]>> {
    if material.is_empty() {
        return Err(Error::KeyDerivation("PRF output is empty".into()));
    }
    let salt = salt.bytes()?;

    let hk = Hkdf::<Sha256>::new(Some(salt), material.expose());
    let mut out = Zeroizing::new([0u8; AES_KEY_BYTES]);
    hk.expand(HKDF_INFO, &mut out[..])
        .map_err(|e| Error::KeyDerivation(format!("hkdf expand failed: {e}")))?;
    Ok(out)
}

pub fn derive_sealing_key(material: &KeyMaterial, salt: KeySalt<'_>) -> Result<SealingKey> {
    Ok(SealingKey {
        key: derive_key(material, salt)?,
    })
}

pub fn derive_opening_key(material: &KeyMaterial, salt: KeySalt<'_>) -> Result<OpeningKey> {
    Ok(OpeningKey {
        key: derive_key(material, salt)?,
    })
}
