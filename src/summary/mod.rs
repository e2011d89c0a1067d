//! Run reporting: console status lines and run_summary.json

mod output;
mod run_summary;

pub use output::Reporter;
pub use run_summary::{RunSummary, TargetSummary, RUN_SUMMARY_SCHEMA_ID, RUN_SUMMARY_SCHEMA_VERSION};
