//! Source of cryptographically secure random bytes.
//!
//! PRF inputs, HKDF salts and nonces all come from here. The default is the
//! operating system RNG; tests plug in their own source.

use crate::error::{Error, Result};

/// Fills buffers with random bytes.
pub trait EntropySource: Send + Sync {
    fn fill(&self, dest: &mut [u8]) -> Result<()>;
}

/// OS-backed randomness via `getrandom`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, dest: &mut [u8]) -> Result<()> {
        getrandom::getrandom(dest).map_err(|e| Error::Entropy(e.to_string()))
    }
}

/// Random fixed-size array.
pub(crate) fn random_array<const N: usize>(source: &dyn EntropySource) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    source.fill(&mut out)?;
    Ok(out)
}

/// Random byte vector of `len` bytes.
pub(crate) fn random_vec(source: &dyn EntropySource, len: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; len];
    source.fill(&mut out)?;
    Ok(out)
}

/// Generate a fresh per-record PRF input of `len` bytes.
pub fn generate_prf_input(source: &dyn EntropySource, len: usize) -> Result<Vec<u8>> {
    random_vec(source, len)
}
