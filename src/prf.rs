//! PRF assertion boundary.
//!
//! The platform authenticator evaluates the WebAuthn PRF extension; this
//! crate only consumes its output. Two seams:
//!
//! - [`PlatformAuthenticator`]: one `navigator.credentials.get` ceremony.
//! - [`PrfAssertionClient`]: `get_prf_result`, the contract the vault uses.
//!
//! [`WebAuthnPrfClient`] implements the second on top of the first: it
//! filters candidate credentials, builds the request and maps the outcome to
//! `NoCredential` / `AssertionFailed` / `PrfUnsupported`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::config::VaultConfig;
use crate::entropy::{self, EntropySource, OsEntropy};
use crate::error::{Error, Result};
use crate::kdf::KeyMaterial;

/// Challenge length for assertion requests.
pub const CHALLENGE_BYTES: usize = 32;

/// Timeout hint passed to the authenticator.
pub const DEFAULT_ASSERTION_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Credential raw id in standard base64, the form stored next to records and
/// written into v3 envelopes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CredentialId(String);

impl CredentialId {
    pub fn from_raw(raw_id: &[u8]) -> Self {
        Self(STANDARD.encode(raw_id))
    }

    /// Validates that `encoded` is non-empty standard base64.
    pub fn from_base64(encoded: impl Into<String>) -> Result<Self> {
        let encoded = encoded.into();
        if encoded.is_empty() {
            return Err(Error::malformed("credential id is empty"));
        }
        STANDARD
            .decode(&encoded)
            .map_err(|e| Error::malformed(format!("credential id is not valid base64: {e}")))?;
        Ok(Self(encoded))
    }

    pub fn as_base64(&self) -> &str {
        &self.0
    }

    pub fn to_raw(&self) -> Vec<u8> {
        // Validated at construction.
        STANDARD.decode(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CredentialId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::from_base64(value)
    }
}

impl From<CredentialId> for String {
    fn from(id: CredentialId) -> Self {
        id.0
    }
}

/// A credential the caller knows about, as persisted by the application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredential {
    pub id: String,
    #[serde(rename = "rawIdBase64", default, skip_serializing_if = "Option::is_none")]
    pub raw_id: Option<CredentialId>,
    #[serde(rename = "type")]
    pub kind: String,
    pub prf_supported: bool,
}

impl StoredCredential {
    pub fn public_key(id: impl Into<String>, raw_id: CredentialId, prf_supported: bool) -> Self {
        Self {
            id: id.into(),
            raw_id: Some(raw_id),
            kind: "public-key".into(),
            prf_supported,
        }
    }
}

/// Keep PRF-capable credentials with a known raw id, restricted to
/// `preferred` when given. Empty result is `NoCredential`.
pub fn select_credentials(
    candidates: &[StoredCredential],
    preferred: Option<&CredentialId>,
) -> Result<Vec<CredentialId>> {
    let selected: Vec<CredentialId> = candidates
        .iter()
        .filter(|c| c.prf_supported)
        .filter_map(|c| c.raw_id.as_ref())
        .filter(|raw_id| preferred.map_or(true, |p| *raw_id == p))
        .cloned()
        .collect();

    if selected.is_empty() {
        return Err(Error::NoCredential);
    }
    Ok(selected)
}

// ---------------------------------------------------------------------------
// Platform ceremony
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerification {
    #[default]
    Required,
    Preferred,
    Discouraged,
}

/// Parameters of one assertion ceremony with the PRF extension.
#[derive(Clone, Debug)]
pub struct AssertionRequest {
    pub challenge: [u8; CHALLENGE_BYTES],
    pub allow_credentials: Vec<CredentialId>,
    /// `extensions.prf.eval.first`
    pub prf_input: Vec<u8>,
    pub user_verification: UserVerification,
    /// Hint for the authenticator UI; the caller enforces its own deadline.
    pub timeout: Duration,
}

/// What the authenticator returned.
pub struct Assertion {
    pub credential: CredentialId,
    /// `getClientExtensionResults().prf.results.first`
    pub prf_first: Option<Zeroizing<Vec<u8>>>,
}

impl fmt::Debug for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assertion")
            .field("credential", &self.credential)
            .field("prf_first", &self.prf_first.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// The platform authenticator. `Ok(None)` means the platform returned no
/// assertion (declined or cancelled by the user).
#[async_trait]
pub trait PlatformAuthenticator: Send + Sync {
    async fn get_assertion(&self, request: &AssertionRequest) -> Result<Option<Assertion>>;
}

#[async_trait]
impl<A: PlatformAuthenticator + ?Sized> PlatformAuthenticator for Arc<A> {
    async fn get_assertion(&self, request: &AssertionRequest) -> Result<Option<Assertion>> {
        (**self).get_assertion(request).await
    }
}

// ---------------------------------------------------------------------------
// PRF client contract
// ---------------------------------------------------------------------------

/// Output of a successful PRF assertion.
#[derive(Debug, Clone)]
pub struct PrfResult {
    pub prf_key: KeyMaterial,
    /// Credential that answered; bind it into new envelopes.
    pub assertion_credential: CredentialId,
}

#[async_trait]
pub trait PrfAssertionClient: Send + Sync {
    async fn get_prf_result(
        &self,
        prf_input: &[u8],
        candidates: &[StoredCredential],
        preferred: Option<&CredentialId>,
    ) -> Result<PrfResult>;
}

/// [`PrfAssertionClient`] over a WebAuthn-style authenticator.
pub struct WebAuthnPrfClient<A> {
    authenticator: A,
    entropy: Arc<dyn EntropySource>,
    user_verification: UserVerification,
    timeout: Duration,
}

impl<A: PlatformAuthenticator> WebAuthnPrfClient<A> {
    pub fn new(authenticator: A) -> Self {
        Self {
            authenticator,
            entropy: Arc::new(OsEntropy),
            user_verification: UserVerification::Required,
            timeout: DEFAULT_ASSERTION_TIMEOUT,
        }
    }

    /// User verification and timeout hint taken from `config`.
    pub fn from_config(authenticator: A, config: &VaultConfig) -> Self {
        Self::new(authenticator)
            .with_user_verification(config.user_verification)
            .with_timeout(config.assertion_timeout())
    }

    pub fn with_entropy(mut self, entropy: Arc<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    pub fn with_user_verification(mut self, user_verification: UserVerification) -> Self {
        self.user_verification = user_verification;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn authenticator(&self) -> &A {
        &self.authenticator
    }

    fn build_request(
        &self,
        prf_input: &[u8],
        candidates: &[StoredCredential],
        preferred: Option<&CredentialId>,
    ) -> Result<AssertionRequest> {
        let allow_credentials = select_credentials(candidates, preferred)?;
        Ok(AssertionRequest {
            challenge: entropy::random_array(self.entropy.as_ref())?,
            allow_credentials,
            prf_input: prf_input.to_vec(),
            user_verification: self.user_verification,
            timeout: self.timeout,
        })
    }
}

#[async_trait]
impl<A: PlatformAuthenticator> PrfAssertionClient for WebAuthnPrfClient<A> {
    async fn get_prf_result(
        &self,
        prf_input: &[u8],
        candidates: &[StoredCredential],
        preferred: Option<&CredentialId>,
    ) -> Result<PrfResult> {
        let request = self.build_request(prf_input, candidates, preferred)?;
        tracing::debug!(
            allowed = request.allow_credentials.len(),
            preferred = ?preferred.map(CredentialId::as_base64),
            "requesting PRF assertion"
        );

        let assertion = self
            .authenticator
            .get_assertion(&request)
            .await?
            .ok_or_else(|| Error::AssertionFailed("authenticator returned no assertion".into()))?;

        if !request.allow_credentials.contains(&assertion.credential) {
            return Err(Error::AssertionFailed(format!(
                "credential {} was not in the allowed set",
                assertion.credential
            )));
        }

        let prf_first = assertion.prf_first.ok_or(Error::PrfUnsupported)?;
        if prf_first.is_empty() {
            return Err(Error::PrfUnsupported);
        }

        tracing::debug!(credential = %assertion.credential, "PRF assertion succeeded");
        Ok(PrfResult {
            prf_key: KeyMaterial::from_bytes(prf_first.to_vec()),
            assertion_credential: assertion.credential,
        })
    }
}
