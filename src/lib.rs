//! # prf-envelope
//!
//! Client-side encryption of small secrets keyed by a WebAuthn PRF output.
//!
//! The authenticator evaluates the PRF extension on a per-record random
//! input. The output is stretched with HKDF-SHA256 into an AES-256-GCM key,
//! and the result is stored as a versioned, colon-delimited envelope that
//! carries everything needed to ask the authenticator for the same output
//! again. The server storing envelopes never sees a key.
//!
//! ## Quick Start
//!
//! ```rust
//! use prf_envelope::{CredentialId, KeyMaterial, VersionRouter};
//!
//! let router = VersionRouter::new();
//!
//! // PRF output for `prf_input`, as returned by the authenticator.
//! let prf_input = [0x24u8; 32];
//! let key = KeyMaterial::from_bytes([0x42u8; 32]);
//! let credential = CredentialId::from_raw(b"credential-raw-id");
//!
//! let envelope = router.encrypt("secret", &prf_input, &key, Some(&credential))?;
//!
//! // Later: read the PRF input back, re-assert, decrypt.
//! let parts = router.extract_parts(&envelope)?;
//! assert_eq!(parts.prf_input, prf_input);
//! assert_eq!(router.decrypt(&envelope, &key)?.as_str(), "secret");
//! # Ok::<(), prf_envelope::Error>(())
//! ```
//!
//! ## Wire versions
//!
//! - **v1** `prfInput:iv:ciphertext:1` (zero HKDF salt, decrypt only)
//! - **v2** `prfInput:hkdfSalt:iv:ciphertext:2`
//! - **v3** `prfInput:credentialRawId:hkdfSalt:iv:ciphertext:3` (current)
//!
//! ## What's NOT Provided
//!
//! - WebAuthn registration or the PRF evaluation itself
//! - Credential or envelope storage
//! - Retries

#![deny(unsafe_code)]
#![doc(html_root_url = "https://docs.rs/prf-envelope/0.1.0")]

// ---------------------------------------------------------------------------
// Internal modules (not part of public API)
// ---------------------------------------------------------------------------

mod aead;

// ---------------------------------------------------------------------------
// Public modules
// ---------------------------------------------------------------------------

pub mod config;
pub mod entropy;
pub mod error;
pub mod kdf;
pub mod prf;
pub mod router;
pub mod vault;
pub mod wire;

pub use config::VaultConfig;
pub use entropy::{EntropySource, OsEntropy};
pub use error::{Error, Result};
pub use kdf::{KeyMaterial, HKDF_INFO};
pub use prf::{
    Assertion, AssertionRequest, CredentialId, PlatformAuthenticator, PrfAssertionClient,
    PrfResult, StoredCredential, UserVerification, WebAuthnPrfClient,
};
pub use router::VersionRouter;
pub use vault::{OpenedRecord, SealedRecord, Vault};
pub use wire::{get_version, inspect, Envelope, EnvelopeInfo, EnvelopeParts, EnvelopeVersion};

// ---------------------------------------------------------------------------
// Version info
// ---------------------------------------------------------------------------

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Envelope version written by default.
pub const CURRENT_ENVELOPE_VERSION: EnvelopeVersion = EnvelopeVersion::LATEST;
