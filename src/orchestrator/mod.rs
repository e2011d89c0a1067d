//! Build orchestration
//!
//! Runs every selected target's operations in declaration order:
//! - a target whose dependency did not succeed is skipped
//! - the first failing operation fails the target and stops its remaining
//!   operations; other targets still run
//! - errors and panics inside an operation become a failed operation
//! - a simulator that cannot be found aborts the run
//!
//! Exit status is 0 only when every target succeeded.

mod background;
mod clean;

pub use background::{boot_invocation, spawn_simulator_boot, SIMULATOR_BOOT_TASK};
pub use clean::{clean_derived_data, default_derived_data_root, CleanError};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, warn};

use crate::coverage::{CoverageCheck, CoverageError, CoverageExtractor, CoverageFormat};
use crate::device::{DeviceError, DeviceLocator};
use crate::runner::{RunnerError, ToolRunner};
use crate::state::{TargetStatus, TargetStatusError};
use crate::summary::Reporter;
use crate::target::{BuildEnvironment, BuildTarget, Operation, SettingsError, TargetSpec};

/// Errors that stop the whole run
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("simulator lookup failed: {0}")]
    Device(#[from] DeviceError),

    #[error("{target} [{operation}] aborted the run: {source}")]
    Fatal {
        target: String,
        operation: Operation,
        #[source]
        source: CoverageError,
    },

    #[error(transparent)]
    State(#[from] TargetStatusError),
}

impl OrchestratorError {
    /// Raw simulator listing to dump for diagnosis, if any
    pub fn device_listing(&self) -> Option<&str> {
        match self {
            OrchestratorError::Device(e) => e.listing(),
            OrchestratorError::Fatal {
                source: CoverageError::Device(e),
                ..
            } => e.listing(),
            _ => None,
        }
    }
}

/// Why a single operation did not produce an exit status
#[derive(Debug, thiserror::Error)]
enum OperationError {
    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Coverage(#[from] CoverageError),
}

/// Result of one executed operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub operation: Operation,
    /// 0 on success
    pub exit_status: i32,
    /// Error or panic message when the operation did not run to completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A target together with what happened to it
#[derive(Debug, Clone)]
pub struct TargetRun {
    pub target: BuildTarget,
    pub operations: Vec<OperationRecord>,
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub targets: Vec<TargetRun>,
}

impl RunOutcome {
    /// 1 if any target failed or was skipped
    pub fn exit_code(&self) -> i32 {
        if self.targets.iter().any(|t| t.target.status().fails_run()) {
            1
        } else {
            0
        }
    }

    pub fn duration_ms(&self) -> u64 {
        u64::try_from((self.finished_at - self.started_at).num_milliseconds()).unwrap_or(0)
    }

    pub fn target(&self, name: &str) -> Option<&TargetRun> {
        self.targets.iter().find(|t| t.target.name() == name)
    }
}

/// Run-level switches
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Remove derived data before building
    pub clean: bool,
    /// Directory holding Xcode's DerivedData
    pub derived_data_root: Option<PathBuf>,
    pub derived_data_prefix: String,
    pub coverage_format: CoverageFormat,
    /// Boot the simulator in the background before iOS test targets
    pub warm_up_simulator: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            clean: true,
            derived_data_root: default_derived_data_root(),
            derived_data_prefix: "MSAL".to_string(),
            coverage_format: CoverageFormat::Report,
            warm_up_simulator: true,
        }
    }
}

/// Sequences targets and their operations
pub struct Orchestrator {
    runner: Arc<dyn ToolRunner>,
    env: BuildEnvironment,
    options: OrchestratorOptions,
    locator: DeviceLocator,
    reporter: Reporter,
}

impl Orchestrator {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        env: BuildEnvironment,
        options: OrchestratorOptions,
        reporter: Reporter,
    ) -> Self {
        let locator = DeviceLocator::new(runner.clone());
        Self {
            runner,
            env,
            options,
            locator,
            reporter,
        }
    }

    pub fn environment(&self) -> &BuildEnvironment {
        &self.env
    }

    /// Run all `specs` in order and aggregate the results.
    pub fn run(&mut self, specs: Vec<TargetSpec>) -> Result<RunOutcome, OrchestratorError> {
        let run_id = ulid::Ulid::new().to_string();
        let started_at = Utc::now();
        info!(run_id = %run_id, targets = specs.len(), "starting run");

        if self.options.clean {
            self.clean();
        }
        if self.options.warm_up_simulator && specs.iter().any(TargetSpec::tests_on_simulator) {
            self.warm_up_simulator()?;
        }

        let mut runs: Vec<TargetRun> = Vec::with_capacity(specs.len());
        for spec in specs {
            let mut run = TargetRun {
                target: BuildTarget::new(spec),
                operations: Vec::new(),
            };

            if let Some((dependency, reason)) = unmet_dependency(&run.target.spec, &runs) {
                self.reporter.skipped(run.target.name(), &dependency, reason);
                warn!(target = %run.target.name(), dependency = %dependency, reason, "skipping target");
                run.target.transition(TargetStatus::Skipped)?;
            } else {
                self.run_target(&mut run)?;
            }
            runs.push(run);
        }

        let outcome = RunOutcome {
            run_id,
            started_at,
            finished_at: Utc::now(),
            targets: runs,
        };
        info!(exit_code = outcome.exit_code(), duration_ms = outcome.duration_ms(), "run finished");
        Ok(outcome)
    }

    fn clean(&self) {
        let Some(ref root) = self.options.derived_data_root else {
            warn!("HOME is not set; skipping derived data cleanup");
            return;
        };
        if let Err(e) = clean_derived_data(root, &self.options.derived_data_prefix) {
            warn!(error = %e, "derived data cleanup failed");
        }
    }

    fn warm_up_simulator(&mut self) -> Result<(), OrchestratorError> {
        let udid = match self.locator.simulator_id(&self.env.simulator_device) {
            Ok(udid) => udid,
            Err(e @ DeviceError::NotFound { .. }) => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "could not locate simulator to pre-boot");
                return Ok(());
            }
        };
        if let Err(e) = spawn_simulator_boot(self.runner.clone(), udid) {
            warn!(error = %e, "could not start simulator boot task");
        }
        Ok(())
    }

    fn run_target(&mut self, run: &mut TargetRun) -> Result<(), OrchestratorError> {
        let span = info_span!("target", name = %run.target.name());
        let _guard = span.enter();

        run.target.transition(TargetStatus::Running)?;

        let operations = run.target.spec.operations.clone();
        let mut failed = false;
        for op in operations {
            let record = self.run_operation(&mut run.target, op)?;
            failed = record.exit_status != 0;
            run.operations.push(record);
            if failed {
                // later operations depend on this one
                break;
            }
        }

        let status = if failed {
            TargetStatus::Failed
        } else {
            TargetStatus::Succeeded
        };
        run.target.transition(status)?;
        self.reporter.target_end(run.target.name(), status);
        Ok(())
    }

    fn run_operation(&mut self, target: &mut BuildTarget, op: Operation) -> Result<OperationRecord, OrchestratorError> {
        self.reporter.operation_start(target.name(), op);

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.execute(target, op)));
        let (exit_status, error) = match result {
            Ok(Ok(status)) => (status, None),
            Ok(Err(OperationError::Coverage(e))) if e.is_fatal() => {
                return Err(OrchestratorError::Fatal {
                    target: target.name().to_string(),
                    operation: op,
                    source: e,
                });
            }
            Ok(Err(e)) => {
                error!(target = %target.name(), operation = %op, error = ?e, "operation raised an error");
                self.reporter.failure(&format!("{} [{}]: {}", target.name(), op, e));
                (1, Some(e.to_string()))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(target = %target.name(), operation = %op, panic = %message, "operation panicked");
                self.reporter.failure(&format!("{} [{}] panicked: {}", target.name(), op, message));
                (1, Some(message))
            }
        };

        self.reporter.operation_end(target.name(), op, exit_status);
        Ok(OperationRecord {
            operation: op,
            exit_status,
            error,
        })
    }

    fn execute(&mut self, target: &mut BuildTarget, op: Operation) -> Result<i32, OperationError> {
        match target.operation_invocation(op, &self.env) {
            Some(invocation) => {
                let filter = self.env.output_filter();
                self.reporter.command(&invocation, filter.as_ref());
                Ok(self.runner.stream(&invocation, filter.as_ref())?)
            }
            None => self.run_codecov(target),
        }
    }

    fn run_codecov(&mut self, target: &mut BuildTarget) -> Result<i32, OperationError> {
        let extractor = CoverageExtractor::new(self.runner.as_ref(), self.options.coverage_format);
        match extractor.compute(target, &self.env, &mut self.locator) {
            Ok(coverage) => {
                let spec = &target.spec;
                let check = CoverageCheck::classify(coverage, spec.min_warn_coverage, spec.min_fail_coverage);
                self.reporter
                    .coverage(&spec.name, &check, spec.min_warn_coverage, spec.min_fail_coverage);
                Ok(check.exit_status())
            }
            Err(e @ CoverageError::MissingArtifact { .. }) => {
                self.reporter.failure(&format!("{}: {}", target.name(), e));
                Ok(1)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Print each target's build settings without running anything.
    /// Returns false if any target's settings could not be resolved.
    pub fn show_build_settings(&mut self, specs: Vec<TargetSpec>) -> bool {
        let mut all_ok = true;
        for spec in specs {
            let name = spec.name.clone();
            let mut target = BuildTarget::new(spec);
            let result: Result<(), SettingsError> = target
                .build_settings(self.runner.as_ref(), &self.env)
                .map(|settings| self.reporter.build_settings(&name, settings));
            if let Err(e) = result {
                error!(target = %name, error = %e, "could not resolve build settings");
                self.reporter.failure(&format!("{}: {}", name, e));
                all_ok = false;
            }
        }
        all_ok
    }
}

/// First dependency of `spec` that has not succeeded earlier in this run
fn unmet_dependency(spec: &TargetSpec, earlier: &[TargetRun]) -> Option<(String, &'static str)> {
    spec.dependencies.iter().find_map(|dep| {
        match earlier.iter().find(|r| r.target.name() == dep) {
            None => Some((dep.clone(), "not built yet")),
            Some(r) if r.target.status() != TargetStatus::Succeeded => Some((dep.clone(), "failed")),
            Some(_) => None,
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Platform;

    fn run_with_status(name: &str, status: TargetStatus) -> TargetRun {
        let mut target = BuildTarget::new(TargetSpec::new(name, name, Platform::Mac).with_operations(&[Operation::Build]));
        match status {
            TargetStatus::Skipped => target.transition(TargetStatus::Skipped).unwrap(),
            TargetStatus::Pending => {}
            other => {
                target.transition(TargetStatus::Running).unwrap();
                if other != TargetStatus::Running {
                    target.transition(other).unwrap();
                }
            }
        }
        TargetRun {
            target,
            operations: Vec::new(),
        }
    }

    #[test]
    fn test_unmet_dependency_not_built() {
        let spec = TargetSpec::new("App", "App", Platform::Ios).with_dependencies(&["Framework"]);
        assert_eq!(unmet_dependency(&spec, &[]), Some(("Framework".to_string(), "not built yet")));
    }

    #[test]
    fn test_unmet_dependency_failed_or_skipped() {
        let spec = TargetSpec::new("App", "App", Platform::Ios).with_dependencies(&["Framework"]);
        let failed = vec![run_with_status("Framework", TargetStatus::Failed)];
        assert_eq!(unmet_dependency(&spec, &failed), Some(("Framework".to_string(), "failed")));
        let skipped = vec![run_with_status("Framework", TargetStatus::Skipped)];
        assert_eq!(unmet_dependency(&spec, &skipped), Some(("Framework".to_string(), "failed")));
    }

    #[test]
    fn test_met_dependency() {
        let spec = TargetSpec::new("App", "App", Platform::Ios).with_dependencies(&["Framework"]);
        let ok = vec![run_with_status("Framework", TargetStatus::Succeeded)];
        assert_eq!(unmet_dependency(&spec, &ok), None);
    }

    #[test]
    fn test_exit_code_aggregation() {
        let now = Utc::now();
        let outcome = RunOutcome {
            run_id: "r".to_string(),
            started_at: now,
            finished_at: now,
            targets: vec![run_with_status("A", TargetStatus::Succeeded)],
        };
        assert_eq!(outcome.exit_code(), 0);

        let outcome = RunOutcome {
            targets: vec![
                run_with_status("A", TargetStatus::Succeeded),
                run_with_status("B", TargetStatus::Skipped),
            ],
            ..outcome
        };
        assert_eq!(outcome.exit_code(), 1);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
