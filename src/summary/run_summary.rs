//! Run summary (run_summary.json)

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::orchestrator::{OperationRecord, RunOutcome};
use crate::state::TargetStatus;
use crate::target::Platform;

/// Schema version for run_summary.json
pub const RUN_SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for run_summary.json
pub const RUN_SUMMARY_SCHEMA_ID: &str = "msal-build/run_summary@1";

/// Result of one target in the summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSummary {
    pub name: String,
    pub scheme: String,
    pub platform: Platform,
    pub status: TargetStatus,
    pub operations: Vec<OperationRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Machine-readable summary of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub schema_version: u32,
    pub schema_id: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub exit_code: i32,
    pub targets_succeeded: usize,
    pub targets_failed: usize,
    pub targets_skipped: usize,
    pub duration_ms: u64,
    pub targets: Vec<TargetSummary>,
    pub human_summary: String,
}

impl RunSummary {
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        let targets: Vec<TargetSummary> = outcome
            .targets
            .iter()
            .map(|run| TargetSummary {
                name: run.target.spec.name.clone(),
                scheme: run.target.spec.scheme.clone(),
                platform: run.target.spec.platform,
                status: run.target.status(),
                operations: run.operations.clone(),
                coverage: run.target.coverage,
                started_at: run.target.started_at,
                finished_at: run.target.finished_at,
                duration_ms: run.target.duration_ms(),
            })
            .collect();

        let count = |status: TargetStatus| targets.iter().filter(|t| t.status == status).count();
        let targets_succeeded = count(TargetStatus::Succeeded);
        let targets_failed = count(TargetStatus::Failed);
        let targets_skipped = count(TargetStatus::Skipped);

        let human_summary = format!(
            "{} target(s): {} succeeded, {} failed, {} skipped",
            targets.len(),
            targets_succeeded,
            targets_failed,
            targets_skipped
        );

        Self {
            schema_version: RUN_SUMMARY_SCHEMA_VERSION,
            schema_id: RUN_SUMMARY_SCHEMA_ID.to_string(),
            run_id: outcome.run_id.clone(),
            created_at: Utc::now(),
            exit_code: outcome.exit_code(),
            targets_succeeded,
            targets_failed,
            targets_skipped,
            duration_ms: outcome.duration_ms(),
            targets,
            human_summary,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write to file
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, json)
    }
}
