//! Unified error type for prf-envelope.
//!
//! Every failure is a distinct, matchable kind. Nothing in this crate
//! converts one kind into another to hide it from the caller.

use thiserror::Error;

use crate::wire::EnvelopeVersion;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Structural parse failure: wrong field count, bad base64, bad lengths.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Trailing tag parsed but names no known version.
    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u32),

    /// The operation is not defined for this version (e.g. `extract_parts` on v1).
    #[error("{operation} is not supported for envelope {version}")]
    UnsupportedOperation {
        operation: &'static str,
        version: EnvelopeVersion,
    },

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Authentication tag mismatch: tampered envelope or wrong key.
    #[error("decryption failed")]
    AeadFailure,

    /// Ciphertext authenticated but the plaintext is not UTF-8.
    #[error("decrypted plaintext is not valid UTF-8")]
    InvalidPlaintext,

    #[error("no PRF-capable credential matches the request")]
    NoCredential,

    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    #[error("PRF extension not supported or returned no output")]
    PrfUnsupported,

    #[error("random number generation failed: {0}")]
    Entropy(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEnvelope(reason.into())
    }

    /// True for the errors raised at the PRF assertion boundary.
    pub fn is_assertion_error(&self) -> bool {
        matches!(
            self,
            Self::NoCredential | Self::AssertionFailed(_) | Self::PrfUnsupported
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(Error::AeadFailure.to_string(), "decryption failed");
        assert_eq!(
            Error::UnsupportedVersion(9).to_string(),
            "unsupported envelope version: 9"
        );
        let e = Error::UnsupportedOperation {
            operation: "extract_parts",
            version: EnvelopeVersion::V1,
        };
        assert_eq!(e.to_string(), "extract_parts is not supported for envelope v1");
    }

    #[test]
    fn assertion_errors_are_classified() {
        assert!(Error::NoCredential.is_assertion_error());
        assert!(Error::PrfUnsupported.is_assertion_error());
        assert!(Error::AssertionFailed("cancelled".into()).is_assertion_error());
        assert!(!Error::AeadFailure.is_assertion_error());
    }
}
