//! Vault configuration.
//!
//! Built from defaults, a JSON document, or `PRF_ENVELOPE_*` environment
//! variables. `validate` runs on every constructor except `Default`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::prf::UserVerification;
use crate::wire::{EnvelopeVersion, PRF_INPUT_BYTES};

/// Shortest PRF input accepted for new records.
pub const MIN_PRF_INPUT_BYTES: usize = 16;

pub const ENV_VERSION: &str = "PRF_ENVELOPE_VERSION";
pub const ENV_PRF_INPUT_LEN: &str = "PRF_ENVELOPE_PRF_INPUT_LEN";
pub const ENV_ASSERTION_TIMEOUT_MS: &str = "PRF_ENVELOPE_ASSERTION_TIMEOUT_MS";
pub const ENV_USER_VERIFICATION: &str = "PRF_ENVELOPE_USER_VERIFICATION";
pub const ENV_MIGRATE_ON_READ: &str = "PRF_ENVELOPE_MIGRATE_ON_READ";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VaultConfig {
    /// Version written by `seal` and targeted by `migrate`.
    pub current_version: EnvelopeVersion,
    /// Length of freshly generated PRF inputs.
    pub prf_input_len: usize,
    /// Deadline applied around every PRF assertion.
    pub assertion_timeout_ms: u64,
    pub user_verification: UserVerification,
    /// Upgrade older envelopes while opening them.
    pub migrate_on_read: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            current_version: EnvelopeVersion::LATEST,
            prf_input_len: PRF_INPUT_BYTES,
            assertion_timeout_ms: 60_000,
            user_verification: UserVerification::Required,
            migrate_on_read: false,
        }
    }
}

impl VaultConfig {
    pub fn assertion_timeout(&self) -> Duration {
        Duration::from_millis(self.assertion_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.current_version.is_writable() {
            return Err(Error::Config(format!(
                "current_version {} is decrypt-only",
                self.current_version
            )));
        }
        if self.prf_input_len < MIN_PRF_INPUT_BYTES {
            return Err(Error::Config(format!(
                "prf_input_len must be at least {MIN_PRF_INPUT_BYTES}, got {}",
                self.prf_input_len
            )));
        }
        if self.assertion_timeout_ms == 0 {
            return Err(Error::Config("assertion_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by whichever `PRF_ENVELOPE_*` variables are set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup(ENV_VERSION) {
            let tag: u32 = parse_var(ENV_VERSION, &v)?;
            config.current_version = EnvelopeVersion::try_from(tag)
                .map_err(|e| Error::Config(format!("{ENV_VERSION}: {e}")))?;
        }
        if let Some(v) = lookup(ENV_PRF_INPUT_LEN) {
            config.prf_input_len = parse_var(ENV_PRF_INPUT_LEN, &v)?;
        }
        if let Some(v) = lookup(ENV_ASSERTION_TIMEOUT_MS) {
            config.assertion_timeout_ms = parse_var(ENV_ASSERTION_TIMEOUT_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_USER_VERIFICATION) {
            config.user_verification = match v.trim().to_ascii_lowercase().as_str() {
                "required" => UserVerification::Required,
                "preferred" => UserVerification::Preferred,
                "discouraged" => UserVerification::Discouraged,
                other => {
                    return Err(Error::Config(format!(
                        "{ENV_USER_VERIFICATION}: unknown value {other:?}"
                    )))
                }
            };
        }
        if let Some(v) = lookup(ENV_MIGRATE_ON_READ) {
            config.migrate_on_read = matches!(v.trim(), "1" | "true" | "yes");
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{name}: cannot parse {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = VaultConfig::default();
        config.validate().unwrap();
        assert_eq!(config.current_version, EnvelopeVersion::V3);
        assert_eq!(config.prf_input_len, 32);
        assert_eq!(config.assertion_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn env_overrides() {
        let config = VaultConfig::from_lookup(lookup(&[
            (ENV_VERSION, "2"),
            (ENV_PRF_INPUT_LEN, "64"),
            (ENV_ASSERTION_TIMEOUT_MS, "1500"),
            (ENV_USER_VERIFICATION, "Preferred"),
            (ENV_MIGRATE_ON_READ, "true"),
        ]))
        .unwrap();
        assert_eq!(config.current_version, EnvelopeVersion::V2);
        assert_eq!(config.prf_input_len, 64);
        assert_eq!(config.assertion_timeout_ms, 1500);
        assert_eq!(config.user_verification, UserVerification::Preferred);
        assert!(config.migrate_on_read);
    }

    #[test]
    fn env_rejects_bad_values() {
        for vars in [
            [(ENV_VERSION, "1")],
            [(ENV_VERSION, "7")],
            [(ENV_PRF_INPUT_LEN, "8")],
            [(ENV_ASSERTION_TIMEOUT_MS, "0")],
            [(ENV_USER_VERIFICATION, "sometimes")],
        ] {
            assert!(
                matches!(VaultConfig::from_lookup(lookup(&vars)), Err(Error::Config(_))),
                "{vars:?}"
            );
        }
    }

    #[test]
    fn json_config() {
        let config =
            VaultConfig::from_json_str(r#"{"current_version":3,"migrate_on_read":true}"#).unwrap();
        assert!(config.migrate_on_read);
        assert_eq!(config.prf_input_len, 32);

        assert!(VaultConfig::from_json_str(r#"{"current_version":1}"#).is_err());
        assert!(VaultConfig::from_json_str(r#"{"bogus":1}"#).is_err());
    }
}
