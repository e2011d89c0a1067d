//! Test account log combiner
//!
//! UI test jobs each leave a `test_account_log_<job>.txt` file behind. This
//! crate gathers them from a directory tree and writes a single report, either
//! grouped per job or interleaved by the `[YYYY-MM-DD HH:MM:SS]` timestamp that
//! prefixes each line.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use globset::{Glob, GlobMatcher};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const LOG_FILE_PATTERN: &str = "test_account_log_*.txt";
pub const DEFAULT_OUTPUT_FILE: &str = "combined_test_account_logs.txt";
pub const FALLBACK_INPUT_DIR: &str = "/tmp/test_logs";

const LOG_FILE_PREFIX: &str = "test_account_log_";
const LOG_FILE_SUFFIX: &str = ".txt";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const RULE_WIDTH: usize = 80;

#[derive(Debug, thiserror::Error)]
pub enum CombineError {
    #[error("input directory does not exist: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("invalid log file pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// How entries are laid out in the combined report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// File order, one block per job
    #[default]
    ByJob,
    /// All lines ordered by timestamp; untimed lines last
    ByTime,
}

/// One line from a job's log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub job: String,
    pub timestamp: Option<NaiveDateTime>,
    pub line: String,
}

/// A log file that contributed nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct CombineReport {
    pub files: Vec<PathBuf>,
    pub skipped: Vec<SkippedFile>,
    pub entries: usize,
    /// Set only when a report was written
    pub output: Option<PathBuf>,
}

impl CombineReport {
    pub fn succeeded(&self) -> bool {
        self.entries > 0
    }
}

/// `$PIPELINE_WORKSPACE/TestAccountLogs`, else `$TEST_LOG_DIR`, else `/tmp/test_logs`
pub fn default_input_dir(pipeline_workspace: Option<OsString>, test_log_dir: Option<OsString>) -> PathBuf {
    match (pipeline_workspace, test_log_dir) {
        (Some(workspace), _) => PathBuf::from(workspace).join("TestAccountLogs"),
        (None, Some(dir)) => PathBuf::from(dir),
        (None, None) => PathBuf::from(FALLBACK_INPUT_DIR),
    }
}

fn log_file_matcher() -> Result<GlobMatcher, CombineError> {
    Ok(Glob::new(LOG_FILE_PATTERN)?.compile_matcher())
}

/// Every log file under `dir`, sorted by the full path string (so `a-b/`
/// precedes `a/`). Falls back to the top level when the recursive walk finds
/// nothing.
pub fn find_log_files(dir: &Path) -> Result<Vec<PathBuf>, CombineError> {
    let matcher = log_file_matcher()?;
    let collect = |max_depth: usize| -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && matcher.is_match(e.file_name()))
            .map(|e| e.into_path())
            .collect();
        files.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
        files
    };

    let files = collect(usize::MAX);
    if files.is_empty() {
        return Ok(collect(1));
    }
    Ok(files)
}

/// `test_account_log_<job>.txt` -> `<job>`
pub fn job_name(path: &Path) -> String {
    let file_name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    let file_name: &str = &file_name;
    let name = file_name.strip_prefix(LOG_FILE_PREFIX).unwrap_or(file_name);
    name.strip_suffix(LOG_FILE_SUFFIX).unwrap_or(name).to_string()
}

/// Parse a leading `[YYYY-MM-DD HH:MM:SS] ` stamp
pub fn extract_timestamp(line: &str) -> Option<NaiveDateTime> {
    let rest = line.strip_prefix('[')?;
    if !rest.contains("] ") {
        return None;
    }
    let end = rest.find(']')?;
    NaiveDateTime::parse_from_str(&rest[..end], TIMESTAMP_FORMAT).ok()
}

/// Read every file's lines in order. Empty and unreadable files are skipped.
pub fn read_entries(files: &[PathBuf], order: SortOrder) -> (Vec<LogEntry>, Vec<SkippedFile>) {
    let mut entries = Vec::new();
    let mut skipped = Vec::new();

    for path in files {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read log file");
                skipped.push(SkippedFile {
                    path: path.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if content.is_empty() {
            warn!(path = %path.display(), "log file is empty");
            skipped.push(SkippedFile {
                path: path.clone(),
                reason: "empty".to_string(),
            });
            continue;
        }

        let job = job_name(path);
        let before = entries.len();
        entries.extend(content.lines().map(|line| LogEntry {
            job: job.clone(),
            timestamp: match order {
                SortOrder::ByTime => extract_timestamp(line),
                SortOrder::ByJob => None,
            },
            line: line.to_string(),
        }));
        debug!(path = %path.display(), lines = entries.len() - before, "read log file");
    }

    (entries, skipped)
}

pub fn sort_entries(entries: &mut [LogEntry], order: SortOrder) {
    if order == SortOrder::ByTime {
        entries.sort_by(|a, b| {
            let key = |e: &LogEntry| e.timestamp.unwrap_or(NaiveDateTime::MAX);
            key(a).cmp(&key(b)).then_with(|| a.job.cmp(&b.job))
        });
    }
}

/// Render the combined report text
pub fn render(entries: &[LogEntry], total_jobs: usize, order: SortOrder, generated: NaiveDateTime) -> String {
    let heavy = "=".repeat(RULE_WIDTH);
    let light = "-".repeat(RULE_WIDTH);

    let mut out = String::new();
    out.push_str(&heavy);
    out.push('\n');
    out.push_str("COMBINED TEST ACCOUNT LOGS\n");
    out.push_str(&format!("Generated: {}\n", generated.format(TIMESTAMP_FORMAT)));
    out.push_str(&format!("Total Jobs: {}\n", total_jobs));
    out.push_str(&format!("Total Entries: {}\n", entries.len()));
    out.push_str(&heavy);
    out.push_str("\n\n");

    let mut current_job: Option<&str> = None;
    for entry in entries {
        if order == SortOrder::ByJob && current_job != Some(entry.job.as_str()) {
            if current_job.is_some() {
                out.push('\n');
            }
            current_job = Some(entry.job.as_str());
            out.push_str(&light);
            out.push('\n');
            out.push_str(&format!("Job: {}\n", entry.job));
            out.push_str(&light);
            out.push('\n');
        }
        out.push_str(&entry.line);
        out.push('\n');
    }
    out
}

/// Combine every log under `input_dir` into `output_file`. Nothing is written
/// when no entries were found.
pub fn combine(input_dir: &Path, output_file: &Path, order: SortOrder) -> Result<CombineReport, CombineError> {
    if !input_dir.exists() {
        return Err(CombineError::MissingInput(input_dir.to_path_buf()));
    }

    let files = find_log_files(input_dir)?;
    let mut report = CombineReport {
        files,
        ..Default::default()
    };
    if report.files.is_empty() {
        return Ok(report);
    }

    let (mut entries, skipped) = read_entries(&report.files, order);
    report.skipped = skipped;
    report.entries = entries.len();
    if entries.is_empty() {
        return Ok(report);
    }

    sort_entries(&mut entries, order);
    let text = render(&entries, report.files.len(), order, Local::now().naive_local());
    fs::write(output_file, text).map_err(|source| CombineError::Write {
        path: output_file.to_path_buf(),
        source,
    })?;
    report.output = Some(output_file.to_path_buf());
    Ok(report)
}
