//! xcodebuild -showBuildSettings parsing

use std::collections::BTreeMap;

use tracing::debug;

use crate::runner::{Invocation, RunnerError, ToolRunner};

/// Errors resolving build settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("xcodebuild -showBuildSettings exited with status {status}: {stderr}")]
    ToolFailed { status: i32, stderr: String },

    #[error("build setting {0} is not defined")]
    Missing(String),

    #[error(transparent)]
    Runner(#[from] RunnerError),
}

/// Resolved build settings for one scheme/configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSettings {
    values: BTreeMap<String, String>,
}

impl BuildSettings {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Like [`get`](Self::get) but a missing key is an error
    pub fn require(&self, key: &str) -> Result<&str, SettingsError> {
        self.get(key).ok_or_else(|| SettingsError::Missing(key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Collect `KEY = value` lines; anything else is ignored.
///
/// When a scheme builds several targets the same key appears once per
/// target block and the last occurrence wins.
pub fn parse_build_settings(output: &str) -> BuildSettings {
    let values = output
        .lines()
        .filter_map(|line| line.split_once(" = "))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect();
    BuildSettings { values }
}

pub(super) fn fetch(runner: &dyn ToolRunner, invocation: &Invocation) -> Result<BuildSettings, SettingsError> {
    let output = runner.capture(invocation)?;
    if !output.succeeded() {
        return Err(SettingsError::ToolFailed {
            status: output.status,
            stderr: output.stderr.trim().to_string(),
        });
    }
    let settings = parse_build_settings(&output.stdout);
    debug!(count = settings.len(), "resolved build settings");
    Ok(settings)
}
