//! Effective configuration with provenance

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::defaults::builtin_config;
use super::merge::merge_layers;
use crate::coverage::CoverageFormat;
use crate::target::{BuildEnvironment, TargetSpec};

/// Typed, merged configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Workspace for targets that name neither project nor workspace
    pub default_workspace: String,

    /// xcodebuild -configuration
    pub configuration: String,

    /// Simulator used for iOS destinations and coverage lookup
    pub simulator_device: String,

    /// Pipe xcodebuild output through xcpretty
    pub use_xcpretty: bool,

    /// Remove derived data before building
    pub clean: bool,

    /// DerivedData directories named `<prefix>-*` are removed by the clean step
    pub derived_data_prefix: String,

    pub coverage_format: CoverageFormat,

    #[serde(rename = "target")]
    pub targets: Vec<TargetSpec>,
}

impl BuildConfig {
    pub fn environment(&self) -> BuildEnvironment {
        BuildEnvironment {
            default_workspace: self.default_workspace.clone(),
            configuration: self.configuration.clone(),
            simulator_device: self.simulator_device.clone(),
            use_xcpretty: self.use_xcpretty,
        }
    }

    /// Check target names are unique and dependencies refer to targets
    /// declared earlier in the list.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::Invalid("no targets configured".to_string()));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for target in &self.targets {
            if target.name.trim().is_empty() {
                return Err(ConfigError::Invalid("target with empty name".to_string()));
            }
            if target.operations.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "target '{}' has no operations",
                    target.name
                )));
            }
            for dep in &target.dependencies {
                if !seen.contains(dep.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "target '{}' depends on '{}', which is not declared before it",
                        target.name, dep
                    )));
                }
            }
            if !seen.insert(target.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate target name '{}'",
                    target.name
                )));
            }
        }
        Ok(())
    }

    /// Restrict to the named targets, keeping declaration order.
    pub fn select(&self, names: &[String]) -> Result<Vec<TargetSpec>, ConfigError> {
        if names.is_empty() {
            return Ok(self.targets.clone());
        }
        if let Some(unknown) = names
            .iter()
            .find(|n| !self.targets.iter().any(|t| &t.name == *n))
        {
            return Err(ConfigError::UnknownTarget(unknown.clone()));
        }
        Ok(self
            .targets
            .iter()
            .filter(|t| names.contains(&t.name))
            .cloned()
            .collect())
    }
}

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    Repo,
    Cli,
}

/// A contributing config source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Merged configuration plus where it came from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub created_at: DateTime<Utc>,
    pub config: BuildConfig,
    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Merge builtin defaults, the repo file (when it exists) and CLI overrides.
    pub fn build(repo_config_path: Option<&Path>, cli_overrides: Option<Value>) -> Result<Self, ConfigError> {
        let mut layers = vec![serde_json::to_value(builtin_config())?];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = repo_config_path {
            if path.exists() {
                let (value, digest) = Self::load_toml_file(path)?;
                debug!(path = %path.display(), digest = %digest, "loaded repo config");
                layers.push(value);
                sources.push(ConfigSource {
                    origin: ConfigOrigin::Repo,
                    path: Some(path.to_string_lossy().to_string()),
                    digest: Some(digest),
                });
            }
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        let config: BuildConfig =
            serde_json::from_value(merged).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;

        Ok(Self {
            created_at: Utc::now(),
            config,
            sources,
        })
    }

    /// Load and parse a TOML file, returning the value and digest
    fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
        let bytes = fs::read(path).map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;
        let value: Value = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

        Ok((value, digest))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
