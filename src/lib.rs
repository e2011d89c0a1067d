//! MSAL build driver
//!
//! Builds, tests and measures code coverage for the MSAL Xcode targets by
//! driving `xcodebuild`, `xcrun llvm-cov` and the simulator tooling, then
//! aggregates a pass/fail report and process exit code.

pub mod config;
pub mod coverage;
pub mod device;
pub mod logging;
pub mod mock;
pub mod orchestrator;
pub mod runner;
pub mod state;
pub mod summary;
pub mod target;

pub use config::{BuildConfig, ConfigError, EffectiveConfig};
pub use coverage::{CoverageCheck, CoverageError, CoverageExtractor, CoverageFormat};
pub use device::{DeviceError, DeviceLocator, OsVersion};
pub use orchestrator::{Orchestrator, OrchestratorError, OrchestratorOptions, RunOutcome};
pub use runner::{Invocation, SystemRunner, ToolOutput, ToolRunner};
pub use state::TargetStatus;
pub use summary::{Reporter, RunSummary};
pub use target::{BuildEnvironment, BuildTarget, Operation, Platform, TargetSpec};
