//! Build target model
//!
//! A [`TargetSpec`] is the static declaration of one buildable unit (scheme,
//! project or workspace, platform, operations). A [`BuildTarget`] is its
//! runtime counterpart: it derives xcodebuild invocations, caches resolved
//! build settings and carries the per-run status and coverage.

mod invocation;
mod settings;

pub use invocation::{BuildEnvironment, ANALYZER_OFF, IOS_SIM_SDK_FLAGS};
pub use settings::{parse_build_settings, BuildSettings, SettingsError};

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::runner::ToolRunner;
use crate::state::{TargetStatus, TargetStatusError};

/// Platform a target builds for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "iOS", alias = "ios")]
    Ios,
    #[serde(rename = "Mac", alias = "mac", alias = "macOS")]
    Mac,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Ios => write!(f, "iOS"),
            Platform::Mac => write!(f, "Mac"),
        }
    }
}

/// An operation a target can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Build,
    Test,
    Codecov,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Build => write!(f, "build"),
            Operation::Test => write!(f, "test"),
            Operation::Codecov => write!(f, "codecov"),
        }
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "build" => Ok(Operation::Build),
            "test" => Ok(Operation::Test),
            "codecov" => Ok(Operation::Codecov),
            other => Err(format!("unknown operation '{}'", other)),
        }
    }
}

/// Static declaration of a build target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSpec {
    /// Display name, unique within a run
    pub name: String,

    /// Xcode scheme
    pub scheme: String,

    /// Explicit .xcodeproj; takes precedence over any workspace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Explicit .xcworkspace; falls back to the default workspace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,

    pub platform: Platform,

    /// Operations in execution order
    pub operations: Vec<Operation>,

    /// Coverage percentage below which a warning is printed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_warn_coverage: Option<f64>,

    /// Coverage percentage below which the target fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_fail_coverage: Option<f64>,

    /// Targets that must have succeeded earlier in the run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    /// Mac destination architecture (e.g. "x86_64")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

impl TargetSpec {
    pub fn new(name: impl Into<String>, scheme: impl Into<String>, platform: Platform) -> Self {
        Self {
            name: name.into(),
            scheme: scheme.into(),
            project: None,
            workspace: None,
            platform,
            operations: Vec::new(),
            min_warn_coverage: None,
            min_fail_coverage: None,
            dependencies: Vec::new(),
            arch: None,
        }
    }

    pub fn with_operations(mut self, operations: &[Operation]) -> Self {
        self.operations = operations.to_vec();
        self
    }

    pub fn with_thresholds(mut self, warn: Option<f64>, fail: Option<f64>) -> Self {
        self.min_warn_coverage = warn;
        self.min_fail_coverage = fail;
        self
    }

    pub fn with_dependencies(mut self, deps: &[&str]) -> Self {
        self.dependencies = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn has_operation(&self, op: Operation) -> bool {
        self.operations.contains(&op)
    }

    /// Whether this target runs tests on a simulator
    pub fn tests_on_simulator(&self) -> bool {
        self.platform == Platform::Ios && self.has_operation(Operation::Test)
    }
}

/// Runtime state of one target during a run
#[derive(Debug, Clone)]
pub struct BuildTarget {
    pub spec: TargetSpec,
    settings: Option<BuildSettings>,
    /// Measured line coverage, set by the codecov operation
    pub coverage: Option<f64>,
    status: TargetStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BuildTarget {
    pub fn new(spec: TargetSpec) -> Self {
        Self {
            spec,
            settings: None,
            coverage: None,
            status: TargetStatus::Pending,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn status(&self) -> TargetStatus {
        self.status
    }

    /// Move to `next`, stamping start/end times.
    pub fn transition(&mut self, next: TargetStatus) -> Result<(), TargetStatusError> {
        if !self.status.can_transition_to(next) {
            return Err(TargetStatusError::InvalidTransition {
                target: self.spec.name.clone(),
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        if next == TargetStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_final() {
            self.finished_at = Some(now);
        }
        self.status = next;
        Ok(())
    }

    /// Wall-clock time between start and finish, if both happened
    pub fn duration_ms(&self) -> Option<u64> {
        let (start, end) = (self.started_at?, self.finished_at?);
        u64::try_from((end - start).num_milliseconds()).ok()
    }

    /// Build settings, fetched from xcodebuild on first use and cached.
    pub fn build_settings(
        &mut self,
        runner: &dyn ToolRunner,
        env: &BuildEnvironment,
    ) -> Result<&BuildSettings, SettingsError> {
        let settings = match self.settings.take() {
            Some(cached) => cached,
            None => settings::fetch(runner, &self.settings_invocation(env))?,
        };
        Ok(self.settings.insert(settings))
    }

    /// Whether build settings have already been resolved
    pub fn has_cached_settings(&self) -> bool {
        self.settings.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRunner;
    use crate::runner::ToolOutput;

    fn ios_spec() -> TargetSpec {
        TargetSpec::new("iOS Framework", "MSAL (iOS Framework)", Platform::Ios)
            .with_operations(&[Operation::Build, Operation::Test, Operation::Codecov])
    }

    #[test]
    fn test_platform_serde_names() {
        let p: Platform = serde_json::from_str("\"iOS\"").unwrap();
        assert_eq!(p, Platform::Ios);
        let p: Platform = serde_json::from_str("\"Mac\"").unwrap();
        assert_eq!(p, Platform::Mac);
        assert_eq!(serde_json::to_string(&Platform::Ios).unwrap(), "\"iOS\"");
    }

    #[test]
    fn test_operation_from_str() {
        assert_eq!("Build".parse::<Operation>().unwrap(), Operation::Build);
        assert_eq!("codecov".parse::<Operation>().unwrap(), Operation::Codecov);
        assert!("archive".parse::<Operation>().is_err());
    }

    #[test]
    fn test_tests_on_simulator() {
        assert!(ios_spec().tests_on_simulator());
        let mac = TargetSpec::new("Mac", "MSAL (Mac)", Platform::Mac).with_operations(&[Operation::Test]);
        assert!(!mac.tests_on_simulator());
        let build_only =
            TargetSpec::new("App", "MSAL Test App (iOS)", Platform::Ios).with_operations(&[Operation::Build]);
        assert!(!build_only.tests_on_simulator());
    }

    #[test]
    fn test_transition_stamps_times() {
        let mut target = BuildTarget::new(ios_spec());
        assert_eq!(target.status(), TargetStatus::Pending);
        target.transition(TargetStatus::Running).unwrap();
        assert!(target.started_at.is_some());
        assert!(target.finished_at.is_none());
        target.transition(TargetStatus::Succeeded).unwrap();
        assert!(target.finished_at.is_some());
        assert!(target.duration_ms().is_some());
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut target = BuildTarget::new(ios_spec());
        let err = target.transition(TargetStatus::Succeeded).unwrap_err();
        assert!(matches!(err, TargetStatusError::InvalidTransition { .. }));
    }

    #[test]
    fn test_build_settings_fetched_once() {
        let runner = MockRunner::new().respond(
            "-showBuildSettings",
            ToolOutput::success("Build settings for action build:\n    BUILD_DIR = /tmp/Build\n"),
        );
        let env = BuildEnvironment::default();
        let mut target = BuildTarget::new(ios_spec());

        assert!(!target.has_cached_settings());
        assert_eq!(target.build_settings(&runner, &env).unwrap().get("BUILD_DIR"), Some("/tmp/Build"));
        assert_eq!(target.build_settings(&runner, &env).unwrap().get("BUILD_DIR"), Some("/tmp/Build"));
        assert!(target.has_cached_settings());
        assert_eq!(runner.count_matching("-showBuildSettings"), 1);
    }

    #[test]
    fn test_failed_settings_not_cached() {
        let runner = MockRunner::new().exit_with("-showBuildSettings", 65);
        let env = BuildEnvironment::default();
        let mut target = BuildTarget::new(ios_spec());

        assert!(target.build_settings(&runner, &env).is_err());
        assert!(!target.has_cached_settings());
        assert!(target.build_settings(&runner, &env).is_err());
        assert_eq!(runner.count_matching("-showBuildSettings"), 2);
    }
}
