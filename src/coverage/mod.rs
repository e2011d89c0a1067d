//! Code coverage extraction and threshold checks
//!
//! After a target's tests ran with `-enableCodeCoverage YES`, Xcode leaves a
//! `Coverage.profdata` under `<BUILD_DIR>/../ProfileData/<device id>/`. The
//! extractor feeds it with the target's executable to `llvm-cov` and reads
//! the overall percentage back.
//!
//! Two output formats are understood:
//! - `report`: the tabular `llvm-cov report`; the percentage is the first
//!   Cover column of the last (TOTAL) row
//! - `export`: `llvm-cov export -summary-only` JSON, `totals.lines.percent`

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::device::{DeviceError, DeviceLocator};
use crate::runner::{Invocation, RunnerError, ToolRunner};
use crate::target::{BuildEnvironment, BuildSettings, BuildTarget, SettingsError};

/// Whitespace-separated field of the TOTAL row holding the percentage
pub const REPORT_PERCENT_FIELD: usize = 3;

/// Coverage errors
#[derive(Debug, thiserror::Error)]
pub enum CoverageError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("{kind} not found at {}", path.display())]
    MissingArtifact { kind: ArtifactKind, path: PathBuf },

    #[error("llvm-cov exited with status {status}: {stderr}")]
    ToolFailed { status: i32, stderr: String },

    #[error("llvm-cov produced no output")]
    EmptyReport,

    #[error("could not read a coverage percentage from: {0}")]
    Unparseable(String),

    #[error(transparent)]
    Runner(#[from] RunnerError),
}

impl CoverageError {
    /// Errors that must abort the whole run rather than fail one target
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoverageError::Device(DeviceError::NotFound { .. }))
    }
}

/// Which coverage artifact was missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Profile,
    Executable,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Profile => write!(f, "coverage profile"),
            ArtifactKind::Executable => write!(f, "executable"),
        }
    }
}

/// llvm-cov output format to request and parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageFormat {
    #[default]
    Report,
    Export,
}

/// Locations of the inputs llvm-cov needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoveragePaths {
    pub profile: PathBuf,
    pub executable: PathBuf,
}

impl CoveragePaths {
    pub fn from_settings(settings: &BuildSettings, device_id: &str) -> Result<Self, SettingsError> {
        let build_dir = Path::new(settings.require("BUILD_DIR")?);
        let products_dir = Path::new(settings.require("CONFIGURATION_BUILD_DIR")?);
        let executable = settings.require("EXECUTABLE_PATH")?;

        Ok(Self {
            profile: build_dir
                .join("..")
                .join("ProfileData")
                .join(device_id)
                .join("Coverage.profdata"),
            executable: products_dir.join(executable),
        })
    }

    /// Fail with the first path that does not exist
    pub fn verify(&self) -> Result<(), CoverageError> {
        if !self.profile.exists() {
            return Err(CoverageError::MissingArtifact {
                kind: ArtifactKind::Profile,
                path: self.profile.clone(),
            });
        }
        if !self.executable.exists() {
            return Err(CoverageError::MissingArtifact {
                kind: ArtifactKind::Executable,
                path: self.executable.clone(),
            });
        }
        Ok(())
    }
}

/// Extract the percentage from `llvm-cov report` output.
///
/// Takes the last non-blank line, splits it on whitespace and strips every
/// character that is not a digit or '.' from field [`REPORT_PERCENT_FIELD`].
pub fn parse_report_total(output: &str) -> Result<f64, CoverageError> {
    let last = output
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or(CoverageError::EmptyReport)?;

    let field = last
        .split_whitespace()
        .nth(REPORT_PERCENT_FIELD)
        .ok_or_else(|| CoverageError::Unparseable(last.trim().to_string()))?;

    let digits: String = field.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
    digits
        .parse::<f64>()
        .map_err(|_| CoverageError::Unparseable(last.trim().to_string()))
}

/// Extract `data[0].totals.lines.percent` from `llvm-cov export -summary-only`.
pub fn parse_export_total(output: &str) -> Result<f64, CoverageError> {
    if output.trim().is_empty() {
        return Err(CoverageError::EmptyReport);
    }
    let value: serde_json::Value = serde_json::from_str(output)
        .map_err(|e| CoverageError::Unparseable(format!("invalid JSON: {}", e)))?;
    value
        .pointer("/data/0/totals/lines/percent")
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| CoverageError::Unparseable("missing data[0].totals.lines.percent".to_string()))
}

/// Runs llvm-cov for targets and records the measured coverage
pub struct CoverageExtractor<'a> {
    runner: &'a dyn ToolRunner,
    format: CoverageFormat,
}

impl<'a> CoverageExtractor<'a> {
    pub fn new(runner: &'a dyn ToolRunner, format: CoverageFormat) -> Self {
        Self { runner, format }
    }

    pub fn invocation(&self, paths: &CoveragePaths) -> Invocation {
        let inv = Invocation::new("xcrun").arg("llvm-cov");
        let inv = match self.format {
            CoverageFormat::Report => inv.arg("report"),
            CoverageFormat::Export => inv.args(["export", "-summary-only"]),
        };
        inv.arg("-instr-profile")
            .arg(paths.profile.to_string_lossy())
            .arg(paths.executable.to_string_lossy())
    }

    /// Measure `target`'s coverage and store it on the target.
    pub fn compute(
        &self,
        target: &mut BuildTarget,
        env: &BuildEnvironment,
        locator: &mut DeviceLocator,
    ) -> Result<f64, CoverageError> {
        let device_id = locator.device_id(target.spec.platform, &env.simulator_device)?;
        let settings = target.build_settings(self.runner, env)?;
        let paths = CoveragePaths::from_settings(settings, &device_id)?;
        paths.verify()?;

        let output = self.runner.capture(&self.invocation(&paths))?;
        if !output.succeeded() {
            return Err(CoverageError::ToolFailed {
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            });
        }

        let coverage = match self.format {
            CoverageFormat::Report => parse_report_total(&output.stdout)?,
            CoverageFormat::Export => parse_export_total(&output.stdout)?,
        };
        debug!(target = %target.spec.name, coverage, "measured coverage");
        target.coverage = Some(coverage);
        Ok(coverage)
    }
}

/// Outcome of comparing a coverage value with a target's thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageCheck {
    pub coverage: f64,
    /// Below the warn threshold
    pub warned: bool,
    /// Below the fail threshold
    pub failed: bool,
}

impl CoverageCheck {
    /// Compare independently against both thresholds.
    pub fn classify(coverage: f64, warn: Option<f64>, fail: Option<f64>) -> Self {
        Self {
            coverage,
            warned: warn.is_some_and(|w| coverage < w),
            failed: fail.is_some_and(|f| coverage < f),
        }
    }

    /// Operation exit status: only a fail-threshold breach is non-zero
    pub fn exit_status(&self) -> i32 {
        if self.failed {
            1
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const REPORT: &str = "\
Filename                      Regions    Missed Regions     Cover   Functions  Missed Functions  Executed       Lines      Missed Lines     Cover
-----------------------------------------------------------------------------------------------------------------------------------------------
MSALPublicClientApplication.m     412                98    76.21%          61                 9    85.25%        1290               301    76.67%
MSALAccount.m                     120                40    66.67%          20                 4    80.00%         300                90    70.00%
-----------------------------------------------------------------------------------------------------------------------------------------------
TOTAL                             532               138    74.06%          81                13    83.95%        1590               391    75.41%

";

    #[test]
    fn test_parse_report_total() {
        assert_eq!(parse_report_total(REPORT).unwrap(), 74.06);
    }

    #[test]
    fn test_parse_report_strips_noise() {
        assert_eq!(parse_report_total("TOTAL 10 2 *80.5%*\n").unwrap(), 80.5);
    }

    #[test]
    fn test_parse_report_empty() {
        assert!(matches!(parse_report_total("\n \n"), Err(CoverageError::EmptyReport)));
    }

    #[test]
    fn test_parse_report_short_line() {
        assert!(matches!(parse_report_total("error: no profile\n"), Err(CoverageError::Unparseable(_))));
    }

    #[test]
    fn test_parse_report_no_digits() {
        assert!(matches!(parse_report_total("TOTAL a b -\n"), Err(CoverageError::Unparseable(_))));
    }

    #[test]
    fn test_parse_export_total() {
        let json = r#"{"data":[{"totals":{"lines":{"count":1590,"covered":1199,"percent":75.41}}}],"type":"llvm.coverage.json.export","version":"2.0.1"}"#;
        assert_eq!(parse_export_total(json).unwrap(), 75.41);
    }

    #[test]
    fn test_parse_export_missing_field() {
        assert!(matches!(parse_export_total(r#"{"data":[]}"#), Err(CoverageError::Unparseable(_))));
        assert!(matches!(parse_export_total("not json"), Err(CoverageError::Unparseable(_))));
    }

    #[test]
    fn test_classify_independent_thresholds() {
        let c = CoverageCheck::classify(65.3, Some(70.0), None);
        assert!(c.warned);
        assert!(!c.failed);
        assert_eq!(c.exit_status(), 0);

        let c = CoverageCheck::classify(40.0, Some(70.0), Some(50.0));
        assert!(c.warned);
        assert!(c.failed);
        assert_eq!(c.exit_status(), 1);

        let c = CoverageCheck::classify(40.0, None, Some(50.0));
        assert!(!c.warned);
        assert!(c.failed);

        let c = CoverageCheck::classify(90.0, Some(70.0), Some(50.0));
        assert!(!c.warned && !c.failed);

        // equal to the threshold is not below it
        let c = CoverageCheck::classify(70.0, Some(70.0), Some(70.0));
        assert!(!c.warned && !c.failed);
    }

    #[test]
    fn test_paths_from_settings() {
        let settings = crate::target::parse_build_settings(
            "BUILD_DIR = /dd/Build/Products\nCONFIGURATION_BUILD_DIR = /dd/Build/Products/Debug\nEXECUTABLE_PATH = MSAL.framework/MSAL\n",
        );
        let paths = CoveragePaths::from_settings(&settings, "ABC-1").unwrap();
        assert_eq!(
            paths.profile,
            PathBuf::from("/dd/Build/Products/../ProfileData/ABC-1/Coverage.profdata")
        );
        assert_eq!(paths.executable, PathBuf::from("/dd/Build/Products/Debug/MSAL.framework/MSAL"));
    }

    #[test]
    fn test_verify_reports_missing_profile_first() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("MSAL");
        fs::write(&exe, b"").unwrap();
        let paths = CoveragePaths {
            profile: dir.path().join("Coverage.profdata"),
            executable: exe,
        };
        match paths.verify() {
            Err(CoverageError::MissingArtifact { kind, path }) => {
                assert_eq!(kind, ArtifactKind::Profile);
                assert!(path.ends_with("Coverage.profdata"));
            }
            other => panic!("expected missing profile, got {:?}", other),
        }
    }

    #[test]
    fn test_export_invocation() {
        let runner = crate::mock::MockRunner::new();
        let extractor = CoverageExtractor::new(&runner, CoverageFormat::Export);
        let paths = CoveragePaths {
            profile: PathBuf::from("/p/Coverage.profdata"),
            executable: PathBuf::from("/e/MSAL"),
        };
        assert_eq!(
            extractor.invocation(&paths).command_line(),
            "xcrun llvm-cov export -summary-only -instr-profile /p/Coverage.profdata /e/MSAL"
        );
    }
}
