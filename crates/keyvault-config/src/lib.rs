//! Split secret reassembly
//!
//! A config file too large for one Key Vault secret is stored base64-encoded
//! across `<name>-1`, `<name>-2`, ... This crate fetches the parts, joins and
//! decodes them, and writes the original bytes back to disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("failed to run az: {0}")]
    Spawn(#[source] io::Error),

    #[error("secret {0} does not exist")]
    NotFound(String),

    #[error("fetching secret {name} failed (exit {status}): {stderr}")]
    Fetch { name: String, status: i32, stderr: String },

    #[error("secret {0} is empty")]
    Empty(String),

    #[error("no parts found for secret {0}")]
    NoParts(String),

    #[error("secret {name} is not valid base64: {source}")]
    Decode {
        name: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Marker az prints on stderr when the secret name is unknown to the vault
pub const NOT_FOUND_MARKER: &str = "SecretNotFound";

/// Where secret values come from
pub trait SecretSource {
    /// Value of `name`. A secret the vault does not have is
    /// [`SecretError::NotFound`]; anything else is a real failure.
    fn fetch(&self, name: &str) -> Result<String, SecretError>;
}

/// Map a failed `az` call to an error
pub fn fetch_failure(name: &str, status: i32, stderr: &str) -> SecretError {
    if stderr.contains(NOT_FOUND_MARKER) {
        SecretError::NotFound(name.to_string())
    } else {
        SecretError::Fetch {
            name: name.to_string(),
            status,
            stderr: stderr.trim().to_string(),
        }
    }
}

/// Reads secrets with `az keyvault secret show`
#[derive(Debug, Clone)]
pub struct AzCliSource {
    vault: String,
}

impl AzCliSource {
    pub fn new(vault: impl Into<String>) -> Self {
        Self { vault: vault.into() }
    }

    pub fn command(&self, name: &str) -> Command {
        let mut cmd = Command::new("az");
        cmd.args(["keyvault", "secret", "show", "--vault-name", &self.vault, "--name", name])
            .args(["--query", "value", "-o", "tsv"]);
        cmd
    }
}

impl SecretSource for AzCliSource {
    fn fetch(&self, name: &str) -> Result<String, SecretError> {
        debug!(vault = %self.vault, name, "fetching secret");
        let output = self.command(name).output().map_err(SecretError::Spawn)?;
        if !output.status.success() {
            return Err(fetch_failure(
                name,
                output.status.code().unwrap_or(-1),
                &String::from_utf8_lossy(&output.stderr),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// `<secret>-<index>`, 1-based
pub fn part_name(secret: &str, index: usize) -> String {
    format!("{}-{}", secret, index)
}

/// Fetch and join the trimmed parts of `secret`. With `parts` unset, parts are
/// read until the vault reports the next one missing; any other failure is
/// returned.
pub fn fetch_parts(source: &dyn SecretSource, secret: &str, parts: Option<usize>) -> Result<String, SecretError> {
    let mut joined = String::new();

    match parts {
        Some(count) => {
            for index in 1..=count {
                let name = part_name(secret, index);
                let value = source.fetch(&name)?;
                joined.push_str(nonempty(&name, &value)?);
            }
        }
        None => {
            let mut index = 1;
            loop {
                let name = part_name(secret, index);
                let value = match source.fetch(&name) {
                    Ok(value) => value,
                    Err(SecretError::NotFound(_)) => {
                        debug!(name = %name, "stopping at first missing part");
                        break;
                    }
                    Err(e) => return Err(e),
                };
                joined.push_str(nonempty(&name, &value)?);
                index += 1;
            }
            if index == 1 {
                return Err(SecretError::NoParts(secret.to_string()));
            }
        }
    }

    Ok(joined)
}

fn nonempty<'a>(name: &str, value: &'a str) -> Result<&'a str, SecretError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SecretError::Empty(name.to_string()));
    }
    Ok(trimmed)
}

/// Fetch, decode and write `secret` to `output`. Returns the byte count.
pub fn restore(
    source: &dyn SecretSource,
    secret: &str,
    parts: Option<usize>,
    output: &Path,
) -> Result<usize, SecretError> {
    let encoded = fetch_parts(source, secret, parts)?;
    let bytes = STANDARD.decode(encoded.as_bytes()).map_err(|source| SecretError::Decode {
        name: secret.to_string(),
        source,
    })?;
    fs::write(output, &bytes).map_err(|source| SecretError::Write {
        path: output.to_path_buf(),
        source,
    })?;
    info!(secret, output = %output.display(), bytes = bytes.len(), "wrote secret config");
    Ok(bytes.len())
}
