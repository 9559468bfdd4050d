//! Wire format
//!
//! An envelope is a list of base64 fields joined with `:` and terminated by a
//! decimal version tag:
//!
//!   v1: prfInput:iv:ciphertext:1
//!   v2: prfInput:hkdfSalt:iv:ciphertext:2
//!   v3: prfInput:credentialRawId:hkdfSalt:iv:ciphertext:3
//!
//! Fields use the standard base64 alphabet with padding, which never contains
//! the delimiter. `credentialRawId` may be empty (unbound record).
//! `ciphertext` is the AES-GCM output including its 16-byte tag.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::prf::CredentialId;

pub const DELIMITER: char = ':';

// ---------------------------------------------------------------------------
// Component sizes
// ---------------------------------------------------------------------------

/// Default PRF input length for new records.
pub const PRF_INPUT_BYTES: usize = 32;

/// Random HKDF salt carried by v2 and v3 envelopes.
pub const HKDF_SALT_BYTES: usize = 16;

/// Length of the constant zero salt implied by v1 envelopes.
pub const LEGACY_SALT_BYTES: usize = 32;

pub const NONCE_BYTES: usize = 12;
pub const AEAD_TAG_BYTES: usize = 16;
pub const AES_KEY_BYTES: usize = 32;

// ---------------------------------------------------------------------------
// Versions
// ---------------------------------------------------------------------------

/// Known envelope versions. The set is closed; adding one is a compile-time
/// change checked by every `match` over it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum EnvelopeVersion {
    /// Zero HKDF salt. Decrypt-only.
    V1 = 1,
    /// Random HKDF salt.
    V2 = 2,
    /// Random HKDF salt + bound credential raw id.
    V3 = 3,
}

impl EnvelopeVersion {
    pub const LATEST: Self = Self::V3;
    pub const ALL: [Self; 3] = [Self::V1, Self::V2, Self::V3];

    /// Numeric tag written as the last field.
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Number of `:`-separated fields, including the tag.
    pub fn field_count(self) -> usize {
        match self {
            Self::V1 => 4,
            Self::V2 => 5,
            Self::V3 => 6,
        }
    }

    /// Whether new envelopes may be written in this version.
    pub fn is_writable(self) -> bool {
        match self {
            Self::V1 => false,
            Self::V2 | Self::V3 => true,
        }
    }

    /// Whether the PRF input and credential can be read ahead of an assertion.
    pub fn supports_extract_parts(self) -> bool {
        match self {
            Self::V1 | Self::V2 => false,
            Self::V3 => true,
        }
    }
}

impl TryFrom<u32> for EnvelopeVersion {
    type Error = Error;

    fn try_from(tag: u32) -> Result<Self> {
        match tag {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            3 => Ok(Self::V3),
            other => Err(Error::UnsupportedVersion(other)),
        }
    }
}

impl From<EnvelopeVersion> for u32 {
    fn from(v: EnvelopeVersion) -> Self {
        v.tag()
    }
}

impl fmt::Display for EnvelopeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.tag())
    }
}

/// Parse the trailing version tag without validating anything else.
pub fn get_version(envelope: &str) -> Result<u32> {
    let (_, tag) = envelope
        .trim()
        .rsplit_once(DELIMITER)
        .ok_or_else(|| Error::malformed("missing ':'-delimited version tag"))?;

    if tag.is_empty() || !tag.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::malformed(format!("version tag {tag:?} is not an integer")));
    }
    tag.parse::<u32>()
        .map_err(|_| Error::malformed(format!("version tag {tag:?} out of range")))
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A decoded envelope, one variant per wire version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    V1 {
        prf_input: Vec<u8>,
        nonce: [u8; NONCE_BYTES],
        ciphertext: Vec<u8>,
    },
    V2 {
        prf_input: Vec<u8>,
        hkdf_salt: Vec<u8>,
        nonce: [u8; NONCE_BYTES],
        ciphertext: Vec<u8>,
    },
    V3 {
        prf_input: Vec<u8>,
        credential: Option<CredentialId>,
        hkdf_salt: Vec<u8>,
        nonce: [u8; NONCE_BYTES],
        ciphertext: Vec<u8>,
    },
}

impl Envelope {
    pub fn version(&self) -> EnvelopeVersion {
        match self {
            Self::V1 { .. } => EnvelopeVersion::V1,
            Self::V2 { .. } => EnvelopeVersion::V2,
            Self::V3 { .. } => EnvelopeVersion::V3,
        }
    }

    pub fn prf_input(&self) -> &[u8] {
        match self {
            Self::V1 { prf_input, .. }
            | Self::V2 { prf_input, .. }
            | Self::V3 { prf_input, .. } => prf_input,
        }
    }

    pub fn hkdf_salt(&self) -> Option<&[u8]> {
        match self {
            Self::V1 { .. } => None,
            Self::V2 { hkdf_salt, .. } | Self::V3 { hkdf_salt, .. } => Some(hkdf_salt),
        }
    }

    pub fn credential(&self) -> Option<&CredentialId> {
        match self {
            Self::V3 { credential, .. } => credential.as_ref(),
            Self::V1 { .. } | Self::V2 { .. } => None,
        }
    }

    pub fn nonce(&self) -> &[u8; NONCE_BYTES] {
        match self {
            Self::V1 { nonce, .. } | Self::V2 { nonce, .. } | Self::V3 { nonce, .. } => nonce,
        }
    }

    pub fn ciphertext(&self) -> &[u8] {
        match self {
            Self::V1 { ciphertext, .. }
            | Self::V2 { ciphertext, .. }
            | Self::V3 { ciphertext, .. } => ciphertext,
        }
    }

    /// Serialize to the colon-delimited string form.
    pub fn encode(&self) -> String {
        let version = self.version();
        let mut fields: Vec<String> = Vec::with_capacity(version.field_count());

        match self {
            Self::V1 {
                prf_input,
                nonce,
                ciphertext,
            } => {
                fields.push(STANDARD.encode(prf_input));
                fields.push(STANDARD.encode(nonce));
                fields.push(STANDARD.encode(ciphertext));
            }
            Self::V2 {
                prf_input,
                hkdf_salt,
                nonce,
                ciphertext,
            } => {
                fields.push(STANDARD.encode(prf_input));
                fields.push(STANDARD.encode(hkdf_salt));
                fields.push(STANDARD.encode(nonce));
                fields.push(STANDARD.encode(ciphertext));
            }
            Self::V3 {
                prf_input,
                credential,
                hkdf_salt,
                nonce,
                ciphertext,
            } => {
                fields.push(STANDARD.encode(prf_input));
                fields.push(
                    credential
                        .as_ref()
                        .map(|c| c.as_base64().to_owned())
                        .unwrap_or_default(),
                );
                fields.push(STANDARD.encode(hkdf_salt));
                fields.push(STANDARD.encode(nonce));
                fields.push(STANDARD.encode(ciphertext));
            }
        }

        fields.push(version.tag().to_string());
        fields.join(":")
    }

    /// Parse an envelope string. The field count must match the trailing tag.
    pub fn decode(envelope: &str) -> Result<Self> {
        let envelope = envelope.trim();
        let version = EnvelopeVersion::try_from(get_version(envelope)?)?;

        let fields: Vec<&str> = envelope.split(DELIMITER).collect();
        if fields.len() != version.field_count() {
            return Err(Error::malformed(format!(
                "{} envelope needs {} fields, found {}",
                version,
                version.field_count(),
                fields.len()
            )));
        }

        match version {
            EnvelopeVersion::V1 => Ok(Self::V1 {
                prf_input: decode_prf_input(fields[0])?,
                nonce: decode_nonce(fields[1])?,
                ciphertext: decode_ciphertext(fields[2])?,
            }),
            EnvelopeVersion::V2 => Ok(Self::V2 {
                prf_input: decode_prf_input(fields[0])?,
                hkdf_salt: decode_field("hkdfSalt", fields[1])?,
                nonce: decode_nonce(fields[2])?,
                ciphertext: decode_ciphertext(fields[3])?,
            }),
            EnvelopeVersion::V3 => Ok(Self::V3 {
                prf_input: decode_prf_input(fields[0])?,
                credential: decode_credential(fields[1])?,
                hkdf_salt: decode_field("hkdfSalt", fields[2])?,
                nonce: decode_nonce(fields[3])?,
                ciphertext: decode_ciphertext(fields[4])?,
            }),
        }
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Envelope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| Error::malformed(format!("{name}: invalid base64: {e}")))
}

fn decode_prf_input(value: &str) -> Result<Vec<u8>> {
    let prf_input = decode_field("prfInput", value)?;
    if prf_input.is_empty() {
        return Err(Error::malformed("prfInput is empty"));
    }
    Ok(prf_input)
}

fn decode_nonce(value: &str) -> Result<[u8; NONCE_BYTES]> {
    let bytes = decode_field("iv", value)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| {
            Error::malformed(format!(
                "iv must be {} bytes, got {}",
                NONCE_BYTES,
                bytes.len()
            ))
        })
}

fn decode_ciphertext(value: &str) -> Result<Vec<u8>> {
    let ciphertext = decode_field("ciphertext", value)?;
    if ciphertext.len() < AEAD_TAG_BYTES {
        return Err(Error::malformed("ciphertext shorter than the authentication tag"));
    }
    Ok(ciphertext)
}

fn decode_credential(value: &str) -> Result<Option<CredentialId>> {
    if value.is_empty() {
        return Ok(None);
    }
    CredentialId::from_base64(value)
        .map(Some)
        .map_err(|_| Error::malformed("credentialRawId: invalid base64"))
}

// ---------------------------------------------------------------------------
// Pre-assertion introspection
// ---------------------------------------------------------------------------

/// Fields needed to request the PRF evaluation that reopens an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeParts {
    pub prf_input: Vec<u8>,
    pub credential: Option<CredentialId>,
    pub hkdf_salt: Option<Vec<u8>>,
    pub nonce: [u8; NONCE_BYTES],
    pub ciphertext: Vec<u8>,
}

/// Only v3 envelopes support this; earlier versions fail with
/// `UnsupportedOperation` even when they would parse.
pub fn extract_parts(envelope: &str) -> Result<EnvelopeParts> {
    let version = EnvelopeVersion::try_from(get_version(envelope)?)?;
    let unsupported = |version| Error::UnsupportedOperation {
        operation: "extract_parts",
        version,
    };
    if !version.supports_extract_parts() {
        return Err(unsupported(version));
    }

    match Envelope::decode(envelope)? {
        Envelope::V3 {
            prf_input,
            credential,
            hkdf_salt,
            nonce,
            ciphertext,
        } => Ok(EnvelopeParts {
            prf_input,
            credential,
            hkdf_salt: Some(hkdf_salt),
            nonce,
            ciphertext,
        }),
        other => Err(unsupported(other.version())),
    }
}

// ---------------------------------------------------------------------------
// Inspection (ops/debugging)
// ---------------------------------------------------------------------------

/// Envelope metadata, extracted without decryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvelopeInfo {
    pub version: EnvelopeVersion,
    pub prf_input_bytes: usize,
    pub credential: Option<CredentialId>,
    pub hkdf_salt_bytes: Option<usize>,
    pub ciphertext_bytes: usize,
    /// Ciphertext minus the tag.
    pub plaintext_bytes: usize,
    pub encoded_len: usize,
}

impl fmt::Display for EnvelopeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "envelope {} | prf input {} B", self.version, self.prf_input_bytes)?;
        match self.hkdf_salt_bytes {
            Some(n) => write!(f, " | hkdf salt {} B", n)?,
            None => write!(f, " | zero salt")?,
        }
        if let Some(cred) = &self.credential {
            write!(f, " | credential {}", cred)?;
        }
        write!(
            f,
            " | {} bytes ({} plaintext)",
            self.ciphertext_bytes, self.plaintext_bytes
        )
    }
}

/// Works for every known version.
pub fn inspect(envelope: &str) -> Result<EnvelopeInfo> {
    let parsed = Envelope::decode(envelope)?;
    Ok(EnvelopeInfo {
        version: parsed.version(),
        prf_input_bytes: parsed.prf_input().len(),
        credential: parsed.credential().cloned(),
        hkdf_salt_bytes: parsed.hkdf_salt().map(<[u8]>::len),
        ciphertext_bytes: parsed.ciphertext().len(),
        plaintext_bytes: parsed.ciphertext().len().saturating_sub(AEAD_TAG_BYTES),
        encoded_len: envelope.trim().len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_v3(credential: Option<CredentialId>) -> Envelope {
        Envelope::V3 {
            prf_input: vec![1u8; PRF_INPUT_BYTES],
            credential,
            hkdf_salt: vec![2u8; HKDF_SALT_BYTES],
            nonce: [3u8; NONCE_BYTES],
            ciphertext: vec![4u8; 21],
        }
    }

    #[test]
    fn version_dispatch() {
        assert_eq!(get_version("a:b:1").unwrap(), 1);
        assert_eq!(get_version("a:b:c:2").unwrap(), 2);
        assert_eq!(get_version("a:b:c:d:3").unwrap(), 3);
        assert_eq!(get_version("a:b:c:d:3\n").unwrap(), 3);
    }

    #[test]
    fn version_requires_trailing_integer() {
        for bad in ["garbage", "3", "a:b:", "a:b:x", "a:b:-1", "a:b:99999999999"] {
            assert!(
                matches!(get_version(bad), Err(Error::MalformedEnvelope(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn unknown_version_is_unsupported() {
        assert_eq!(
            Envelope::decode("AA==:AA==:9"),
            Err(Error::UnsupportedVersion(9))
        );
        assert_eq!(EnvelopeVersion::try_from(0), Err(Error::UnsupportedVersion(0)));
    }

    #[test]
    fn v3_encode_layout() {
        let cred = CredentialId::from_raw(b"cred-1");
        let encoded = sample_v3(Some(cred.clone())).encode();
        let fields: Vec<&str> = encoded.split(':').collect();
        assert_eq!(fields.len(), 6);
        assert_eq!(fields[1], cred.as_base64());
        assert_eq!(fields[5], "3");
        assert_eq!(Envelope::decode(&encoded).unwrap(), sample_v3(Some(cred)));
    }

    #[test]
    fn v3_empty_credential_field() {
        let encoded = sample_v3(None).encode();
        assert_eq!(encoded.split(':').nth(1), Some(""));
        assert_eq!(Envelope::decode(&encoded).unwrap().credential(), None);
    }

    #[test]
    fn field_count_mismatch_is_malformed() {
        let encoded = sample_v3(None).encode();
        let v2_tagged = encoded.replace(":3", ":2");
        assert!(matches!(
            Envelope::decode(&v2_tagged),
            Err(Error::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn invalid_base64_is_malformed() {
        let nonce = STANDARD.encode([0u8; 12]);
        let ct = STANDARD.encode([0u8; 16]);
        let bad = format!("!!!!:{nonce}:{ct}:1");
        assert!(matches!(Envelope::decode(&bad), Err(Error::MalformedEnvelope(_))));
    }

    #[test]
    fn bad_lengths_are_malformed() {
        let prf = STANDARD.encode([1u8; 32]);
        let short_nonce = STANDARD.encode([0u8; 8]);
        let nonce = STANDARD.encode([0u8; 12]);
        let ct = STANDARD.encode([0u8; 16]);
        let short_ct = STANDARD.encode([0u8; 4]);

        for bad in [
            format!("{prf}:{short_nonce}:{ct}:1"),
            format!("{prf}:{nonce}:{short_ct}:1"),
            format!(":{nonce}:{ct}:1"),
        ] {
            assert!(matches!(Envelope::decode(&bad), Err(Error::MalformedEnvelope(_))), "{bad}");
        }
    }

    #[test]
    fn extract_parts_only_for_v3() {
        let parts = extract_parts(&sample_v3(None).encode()).unwrap();
        assert_eq!(parts.prf_input, vec![1u8; PRF_INPUT_BYTES]);
        assert_eq!(parts.hkdf_salt.as_deref(), Some(&[2u8; HKDF_SALT_BYTES][..]));

        let v1 = Envelope::V1 {
            prf_input: vec![1u8; 32],
            nonce: [0u8; 12],
            ciphertext: vec![0u8; 16],
        };
        assert_eq!(
            extract_parts(&v1.encode()),
            Err(Error::UnsupportedOperation {
                operation: "extract_parts",
                version: EnvelopeVersion::V1
            })
        );
    }

    #[test]
    fn inspect_reports_sizes() {
        let info = inspect(&sample_v3(None).encode()).unwrap();
        assert_eq!(info.version, EnvelopeVersion::V3);
        assert_eq!(info.hkdf_salt_bytes, Some(HKDF_SALT_BYTES));
        assert_eq!(info.plaintext_bytes, 5);
        assert!(info.to_string().starts_with("envelope v3 | prf input 32 B"));
    }

    #[test]
    fn version_serde_uses_integer_tag() {
        assert_eq!(serde_json::to_string(&EnvelopeVersion::V2).unwrap(), "2");
        let v: EnvelopeVersion = serde_json::from_str("3").unwrap();
        assert_eq!(v, EnvelopeVersion::V3);
        assert!(serde_json::from_str::<EnvelopeVersion>("7").is_err());
    }
}
