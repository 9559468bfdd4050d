//! Version router: dispatches envelope operations to the codec and key
//! derivation parameters of each wire version.

use std::sync::Arc;

use zeroize::Zeroizing;

use crate::entropy::{self, EntropySource, OsEntropy};
use crate::error::{Error, Result};
use crate::kdf::{self, KeyMaterial, KeySalt};
use crate::prf::CredentialId;
use crate::wire::{self, Envelope, EnvelopeParts, EnvelopeVersion, HKDF_SALT_BYTES};

/// Encrypts in one configured version, decrypts every known version.
///
/// Stateless apart from its configuration; safe to share across tasks.
///
/// ```
/// use prf_envelope::{KeyMaterial, VersionRouter};
///
/// let router = VersionRouter::new();
/// let key = KeyMaterial::from_bytes([7u8; 32]);
/// let envelope = router.encrypt("secret", &[1u8; 32], &key, None)?;
///
/// assert_eq!(router.get_version(&envelope)?, 3);
/// assert_eq!(router.decrypt(&envelope, &key)?.as_str(), "secret");
/// # Ok::<(), prf_envelope::Error>(())
/// ```
#[derive(Clone)]
pub struct VersionRouter {
    current: EnvelopeVersion,
    entropy: Arc<dyn EntropySource>,
}

impl Default for VersionRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VersionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionRouter")
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl VersionRouter {
    /// Router writing [`EnvelopeVersion::LATEST`] with OS randomness.
    pub fn new() -> Self {
        Self {
            current: EnvelopeVersion::LATEST,
            entropy: Arc::new(OsEntropy),
        }
    }

    /// Router writing `version`. v1 is decrypt-only and rejected here.
    pub fn with_version(version: EnvelopeVersion) -> Result<Self> {
        if !version.is_writable() {
            return Err(Error::UnsupportedOperation {
                operation: "encrypt",
                version,
            });
        }
        Ok(Self {
            current: version,
            entropy: Arc::new(OsEntropy),
        })
    }

    pub fn with_entropy(mut self, entropy: Arc<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    pub fn current_version(&self) -> EnvelopeVersion {
        self.current
    }

    pub(crate) fn entropy(&self) -> &dyn EntropySource {
        self.entropy.as_ref()
    }

    /// Encrypt `plaintext` under the current version.
    ///
    /// `prf_input` must be the input `key` was evaluated on. `credential` is
    /// recorded by v3 and ignored by v2.
    pub fn encrypt(
        &self,
        plaintext: &str,
        prf_input: &[u8],
        key: &KeyMaterial,
        credential: Option<&CredentialId>,
    ) -> Result<String> {
        if prf_input.is_empty() {
            return Err(Error::KeyDerivation("PRF input is empty".into()));
        }

        let hkdf_salt: [u8; HKDF_SALT_BYTES] = entropy::random_array(self.entropy())?;
        let nonce = entropy::random_array(self.entropy())?;
        let sealing = kdf::derive_sealing_key(key, KeySalt::Explicit(&hkdf_salt))?;
        let ciphertext = sealing.seal(&nonce, plaintext.as_bytes())?;

        let envelope = match self.current {
            EnvelopeVersion::V1 => {
                return Err(Error::UnsupportedOperation {
                    operation: "encrypt",
                    version: EnvelopeVersion::V1,
                })
            }
            EnvelopeVersion::V2 => Envelope::V2 {
                prf_input: prf_input.to_vec(),
                hkdf_salt: hkdf_salt.to_vec(),
                nonce,
                ciphertext,
            },
            EnvelopeVersion::V3 => Envelope::V3 {
                prf_input: prf_input.to_vec(),
                credential: credential.cloned(),
                hkdf_salt: hkdf_salt.to_vec(),
                nonce,
                ciphertext,
            },
        };

        tracing::debug!(
            version = %self.current,
            plaintext_len = plaintext.len(),
            bound = envelope.credential().is_some(),
            "sealed envelope"
        );
        Ok(envelope.encode())
    }

    /// Decrypt an envelope of any known version.
    pub fn decrypt(&self, envelope: &str, key: &KeyMaterial) -> Result<Zeroizing<String>> {
        let parsed = Envelope::decode(envelope)?;
        let salt = match &parsed {
            Envelope::V1 { .. } => KeySalt::LegacyZero,
            Envelope::V2 { hkdf_salt, .. } | Envelope::V3 { hkdf_salt, .. } => {
                KeySalt::Explicit(hkdf_salt)
            }
        };

        let opening = kdf::derive_opening_key(key, salt)?;
        let plaintext = opening.open(parsed.nonce(), parsed.ciphertext()).map_err(|e| {
            tracing::debug!(version = %parsed.version(), "envelope failed authentication");
            e
        })?;

        let text = std::str::from_utf8(&plaintext).map_err(|_| Error::InvalidPlaintext)?;
        tracing::debug!(version = %parsed.version(), "opened envelope");
        Ok(Zeroizing::new(text.to_owned()))
    }

    /// See [`wire::extract_parts`]; v3 only.
    pub fn extract_parts(&self, envelope: &str) -> Result<EnvelopeParts> {
        wire::extract_parts(envelope)
    }

    /// Trailing version tag of `envelope`.
    pub fn get_version(&self, envelope: &str) -> Result<u32> {
        wire::get_version(envelope)
    }

    /// Re-encrypt under the current version.
    ///
    /// Returns the input unchanged when it is already current or newer; a
    /// router writing an older version never downgrades a record. Otherwise
    /// the result keeps the record's PRF input (the one `key` was evaluated
    /// on) and carries a fresh HKDF salt and nonce. The input is never modified;
    /// callers persist the returned envelope and discard the old one.
    pub fn migrate(
        &self,
        envelope: &str,
        key: &KeyMaterial,
        credential: Option<&CredentialId>,
    ) -> Result<String> {
        let parsed = Envelope::decode(envelope)?;
        if parsed.version() >= self.current {
            return Ok(envelope.to_owned());
        }
        let prf_input = parsed.prf_input().to_vec();
        self.reencrypt(envelope, key, &prf_input, key, credential)
    }

    /// Re-key an envelope under a new PRF input.
    ///
    /// `new_key` must be the PRF output for `new_prf_input`. Always produces a
    /// new envelope in the current version, even if the input is current.
    pub fn migrate_to(
        &self,
        envelope: &str,
        old_key: &KeyMaterial,
        new_prf_input: &[u8],
        new_key: &KeyMaterial,
        credential: Option<&CredentialId>,
    ) -> Result<String> {
        self.reencrypt(envelope, old_key, new_prf_input, new_key, credential)
    }

    fn reencrypt(
        &self,
        envelope: &str,
        old_key: &KeyMaterial,
        prf_input: &[u8],
        new_key: &KeyMaterial,
        credential: Option<&CredentialId>,
    ) -> Result<String> {
        let from = EnvelopeVersion::try_from(wire::get_version(envelope)?)?;
        let plaintext = self.decrypt(envelope, old_key)?;
        let migrated = self.encrypt(&plaintext, prf_input, new_key, credential)?;
        tracing::debug!(%from, to = %self.current, "migrated envelope");
        Ok(migrated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> KeyMaterial {
        KeyMaterial::from_bytes([0x11u8; 32])
    }

    #[test]
    fn v1_cannot_be_write_version() {
        assert_eq!(
            VersionRouter::with_version(EnvelopeVersion::V1).unwrap_err(),
            Error::UnsupportedOperation {
                operation: "encrypt",
                version: EnvelopeVersion::V1
            }
        );
    }

    #[test]
    fn v2_router_writes_v2() {
        let router = VersionRouter::with_version(EnvelopeVersion::V2).unwrap();
        let cred = CredentialId::from_raw(b"cred");
        let env = router.encrypt("hi", &[5u8; 32], &key(), Some(&cred)).unwrap();
        assert_eq!(router.get_version(&env).unwrap(), 2);
        assert_eq!(env.split(':').count(), 5);
        assert_eq!(router.decrypt(&env, &key()).unwrap().as_str(), "hi");
    }

    #[test]
    fn empty_prf_input_rejected() {
        let router = VersionRouter::new();
        assert!(matches!(
            router.encrypt("hi", &[], &key(), None),
            Err(Error::KeyDerivation(_))
        ));
    }

    #[test]
    fn migrate_current_is_noop() {
        let router = VersionRouter::new();
        let env = router.encrypt("hi", &[5u8; 32], &key(), None).unwrap();
        assert_eq!(router.migrate(&env, &key(), None).unwrap(), env);
    }

    #[test]
    fn migrate_never_downgrades() {
        let cred = CredentialId::from_raw(b"cred");
        let env = VersionRouter::new()
            .encrypt("hi", &[5u8; 32], &key(), Some(&cred))
            .unwrap();

        let v2 = VersionRouter::with_version(EnvelopeVersion::V2).unwrap();
        let out = v2.migrate(&env, &key(), Some(&cred)).unwrap();
        assert_eq!(out, env);
        assert_eq!(v2.extract_parts(&out).unwrap().credential, Some(cred));
    }

    #[test]
    fn migrate_v2_keeps_prf_input() {
        let v2 = VersionRouter::with_version(EnvelopeVersion::V2).unwrap();
        let env = v2.encrypt("hi", &[5u8; 32], &key(), None).unwrap();

        let router = VersionRouter::new();
        let cred = CredentialId::from_raw(b"cred");
        let migrated = router.migrate(&env, &key(), Some(&cred)).unwrap();
        let parts = router.extract_parts(&migrated).unwrap();
        assert_eq!(parts.prf_input, vec![5u8; 32]);
        assert_eq!(parts.credential, Some(cred));
        assert_eq!(router.decrypt(&migrated, &key()).unwrap().as_str(), "hi");
    }
}
