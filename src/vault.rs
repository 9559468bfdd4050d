//! Vault: PRF assertion + version router for whole data-string records.
//!
//! ```text
//! seal:    fresh prfInput ─► assertion ─► encrypt (current version, bound credential)
//! open:    prfInput from envelope ─► assertion ─► decrypt [─► migrate if enabled]
//! migrate: assertion(old input) ─► decrypt ─► fresh prfInput ─► assertion ─► encrypt
//! ```
//!
//! Every assertion runs under `VaultConfig::assertion_timeout`. No retries.

use zeroize::Zeroizing;

use crate::config::VaultConfig;
use crate::entropy;
use crate::error::{Error, Result};
use crate::prf::{CredentialId, PrfAssertionClient, PrfResult, StoredCredential};
use crate::router::VersionRouter;
use crate::wire::{self, Envelope, EnvelopeVersion};

/// A freshly sealed record, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedRecord {
    pub envelope: String,
    /// Credential whose PRF output protects the record.
    pub credential: CredentialId,
}

/// Result of opening a stored record.
#[derive(Debug)]
pub struct OpenedRecord {
    pub plaintext: Zeroizing<String>,
    pub version: EnvelopeVersion,
    pub credential: CredentialId,
    /// Upgraded envelope when migrate-on-read applied; the caller persists it.
    pub migrated: Option<String>,
}

pub struct Vault<C> {
    client: C,
    router: VersionRouter,
    config: VaultConfig,
}

impl<C: PrfAssertionClient> Vault<C> {
    pub fn new(client: C, config: VaultConfig) -> Result<Self> {
        config.validate()?;
        let router = VersionRouter::with_version(config.current_version)?;
        Ok(Self {
            client,
            router,
            config,
        })
    }

    /// Use a preconfigured router (custom entropy). Its version wins over the config's.
    pub fn with_router(client: C, router: VersionRouter, mut config: VaultConfig) -> Result<Self> {
        config.current_version = router.current_version();
        config.validate()?;
        Ok(Self {
            client,
            router,
            config,
        })
    }

    pub fn router(&self) -> &VersionRouter {
        &self.router
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Encrypt a new data string with any PRF-capable candidate.
    pub async fn seal(
        &self,
        plaintext: &str,
        candidates: &[StoredCredential],
    ) -> Result<SealedRecord> {
        let prf_input =
            entropy::generate_prf_input(self.router.entropy(), self.config.prf_input_len)?;
        let prf = self.assert(&prf_input, candidates, None).await?;

        let envelope = self.router.encrypt(
            plaintext,
            &prf_input,
            &prf.prf_key,
            Some(&prf.assertion_credential),
        )?;
        Ok(SealedRecord {
            envelope,
            credential: prf.assertion_credential,
        })
    }

    /// Decrypt a stored record.
    ///
    /// v3 envelopes name their credential; for v1/v2 pass the credential
    /// reference stored with the record as `credential_hint`.
    ///
    /// A failed migrate-on-read does not fail the open: the plaintext is
    /// returned with `migrated: None` and the error is logged.
    pub async fn open(
        &self,
        envelope: &str,
        candidates: &[StoredCredential],
        credential_hint: Option<&CredentialId>,
    ) -> Result<OpenedRecord> {
        let (prf_input, bound, version) = read_assertion_inputs(envelope)?;
        let preferred = bound.as_ref().or(credential_hint);
        let prf = self.assert(&prf_input, candidates, preferred).await?;

        let plaintext = self.router.decrypt(envelope, &prf.prf_key)?;

        let current = self.router.current_version();
        let migrated = if self.config.migrate_on_read && version < current {
            match self
                .router
                .migrate(envelope, &prf.prf_key, Some(&prf.assertion_credential))
            {
                Ok(upgraded) => {
                    tracing::info!(from = %version, to = %current, "migrated envelope on read");
                    Some(upgraded)
                }
                Err(e) => {
                    tracing::warn!(
                        from = %version,
                        to = %current,
                        error = %e,
                        "migrate on read failed"
                    );
                    None
                }
            }
        } else {
            None
        };

        Ok(OpenedRecord {
            plaintext,
            version,
            credential: prf.assertion_credential,
            migrated,
        })
    }

    /// Rotate a record to the current version under a fresh PRF input.
    ///
    /// Envelopes at or above the current version are returned unchanged. The
    /// input envelope stays valid until the caller replaces it with the
    /// returned one.
    pub async fn migrate(
        &self,
        envelope: &str,
        candidates: &[StoredCredential],
        credential_hint: Option<&CredentialId>,
    ) -> Result<String> {
        let (prf_input, bound, version) = read_assertion_inputs(envelope)?;
        if version >= self.router.current_version() {
            return Ok(envelope.to_owned());
        }

        let preferred = bound.as_ref().or(credential_hint);
        let old = self.assert(&prf_input, candidates, preferred).await?;

        let new_input =
            entropy::generate_prf_input(self.router.entropy(), self.config.prf_input_len)?;
        let new = self
            .assert(&new_input, candidates, Some(&old.assertion_credential))
            .await?;

        self.router.migrate_to(
            envelope,
            &old.prf_key,
            &new_input,
            &new.prf_key,
            Some(&new.assertion_credential),
        )
    }

    async fn assert(
        &self,
        prf_input: &[u8],
        candidates: &[StoredCredential],
        preferred: Option<&CredentialId>,
    ) -> Result<PrfResult> {
        let timeout = self.config.assertion_timeout();
        match tokio::time::timeout(
            timeout,
            self.client.get_prf_result(prf_input, candidates, preferred),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.assertion_timeout_ms,
                    "PRF assertion timed out"
                );
                Err(Error::AssertionFailed(format!(
                    "timed out after {} ms",
                    self.config.assertion_timeout_ms
                )))
            }
        }
    }
}

/// PRF input, bound credential and version needed before asserting.
///
/// v3 goes through `extract_parts`. v1/v2 predate it; their PRF input is read
/// from the full legacy decode.
fn read_assertion_inputs(
    envelope: &str,
) -> Result<(Vec<u8>, Option<CredentialId>, EnvelopeVersion)> {
    let version = EnvelopeVersion::try_from(wire::get_version(envelope)?)?;
    match version {
        EnvelopeVersion::V3 => {
            let parts = wire::extract_parts(envelope)?;
            Ok((parts.prf_input, parts.credential, version))
        }
        EnvelopeVersion::V1 | EnvelopeVersion::V2 => {
            let legacy = Envelope::decode(envelope)?;
            Ok((legacy.prf_input().to_vec(), None, version))
        }
    }
}
