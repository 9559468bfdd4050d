//! prf-envelope CLI: operational tooling for stored envelopes
//!
//! Usage:
//!   prf-envelope inspect <ENVELOPE>
//!   prf-envelope version <ENVELOPE>
//!   prf-envelope encrypt --key-material <B64> [--prf-input <B64>] [--credential <B64>] [PLAINTEXT]
//!   prf-envelope decrypt --key-material <B64> <ENVELOPE>
//!   prf-envelope migrate --key-material <B64> [--credential <B64>] <ENVELOPE>
//!
//! Key material is the base64 PRF output for the envelope's PRF input. An
//! envelope or plaintext of `-` is read from stdin.

use std::io::{self, Read};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};

use prf_envelope::entropy::{generate_prf_input, OsEntropy};
use prf_envelope::wire::PRF_INPUT_BYTES;
use prf_envelope::{inspect, CredentialId, EnvelopeVersion, KeyMaterial, VersionRouter};

#[derive(Parser)]
#[command(name = "prf-envelope", version, about = "Inspect and transform PRF-keyed envelopes")]
struct Cli {
    /// Envelope version to write (2 or 3).
    #[arg(long, global = true, env = "PRF_ENVELOPE_VERSION", default_value_t = 3)]
    write_version: u32,

    /// Print machine-readable JSON where supported.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show envelope metadata (no decryption).
    Inspect { envelope: String },
    /// Print the envelope's version tag.
    Version { envelope: String },
    /// Encrypt a plaintext.
    Encrypt {
        #[arg(long, env = "PRF_ENVELOPE_KEY_MATERIAL", hide_env_values = true)]
        key_material: String,
        /// PRF input the key material was evaluated on (random if omitted).
        #[arg(long)]
        prf_input: Option<String>,
        #[arg(long)]
        credential: Option<String>,
        #[arg(default_value = "-")]
        plaintext: String,
    },
    /// Decrypt an envelope.
    Decrypt {
        #[arg(long, env = "PRF_ENVELOPE_KEY_MATERIAL", hide_env_values = true)]
        key_material: String,
        envelope: String,
    },
    /// Upgrade an envelope to the write version.
    Migrate {
        #[arg(long, env = "PRF_ENVELOPE_KEY_MATERIAL", hide_env_values = true)]
        key_material: String,
        #[arg(long)]
        credential: Option<String>,
        envelope: String,
    },
}

fn main() -> ExitCode {
    init_logging();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let log_format = std::env::var("PRF_ENVELOPE_LOG_FORMAT").unwrap_or_else(|_| "pretty".into());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr);
    if log_format == "json" {
        builder.json().with_target(true).init();
    } else {
        builder.init();
    }
}

fn run(cli: Cli) -> Result<()> {
    let version = EnvelopeVersion::try_from(cli.write_version)?;
    let router = VersionRouter::with_version(version)?;

    match cli.command {
        Command::Inspect { envelope } => {
            let info = inspect(&read_arg(envelope)?)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("{}", info);
            }
        }
        Command::Version { envelope } => {
            println!("{}", router.get_version(&read_arg(envelope)?)?);
        }
        Command::Encrypt {
            key_material,
            prf_input,
            credential,
            plaintext,
        } => {
            let key = KeyMaterial::from_base64(&key_material)?;
            let prf_input = match prf_input {
                Some(b64) => STANDARD
                    .decode(b64.trim())
                    .context("--prf-input is not valid base64")?,
                None => generate_prf_input(&OsEntropy, PRF_INPUT_BYTES)?,
            };
            let credential = parse_credential(credential)?;
            let plaintext = read_arg(plaintext)?;
            println!(
                "{}",
                router.encrypt(&plaintext, &prf_input, &key, credential.as_ref())?
            );
        }
        Command::Decrypt {
            key_material,
            envelope,
        } => {
            let key = KeyMaterial::from_base64(&key_material)?;
            let plaintext = router
                .decrypt(&read_arg(envelope)?, &key)
                .context("decrypt failed")?;
            println!("{}", plaintext.as_str());
        }
        Command::Migrate {
            key_material,
            credential,
            envelope,
        } => {
            let key = KeyMaterial::from_base64(&key_material)?;
            let credential = parse_credential(credential)?;
            let migrated = router
                .migrate(&read_arg(envelope)?, &key, credential.as_ref())
                .context("migrate failed")?;
            println!("{}", migrated);
        }
    }
    Ok(())
}

fn parse_credential(credential: Option<String>) -> Result<Option<CredentialId>> {
    credential
        .map(|c| CredentialId::from_base64(c).context("--credential"))
        .transpose()
}

fn read_arg(value: String) -> Result<String> {
    if value != "-" {
        return Ok(value);
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("reading stdin")?;
    let trimmed = buf.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        bail!("stdin is empty");
    }
    Ok(trimmed.to_owned())
}
