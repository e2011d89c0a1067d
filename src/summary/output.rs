//! Colored console status lines
//!
//! Progress and results meant for the person watching the build. Diagnostic
//! logging goes through `tracing` instead.

use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};

use console::{style, Style, Term};

use crate::coverage::CoverageCheck;
use crate::orchestrator::RunOutcome;
use crate::runner::Invocation;
use crate::state::TargetStatus;
use crate::target::{BuildSettings, Operation};

/// Writes status lines to stdout, or to any writer handed to
/// [`Reporter::to_writer`]
#[derive(Clone)]
pub struct Reporter {
    out: Arc<Mutex<dyn Write + Send>>,
    quiet: bool,
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter").field("quiet", &self.quiet).finish_non_exhaustive()
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Reporter {
    pub fn new(quiet: bool) -> Self {
        Self {
            out: Arc::new(Mutex::new(Term::stdout())),
            quiet,
        }
    }

    pub fn to_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            out: Arc::new(Mutex::new(writer)),
            quiet: false,
        }
    }

    /// A reporter that prints nothing
    pub fn quiet() -> Self {
        Self::new(true)
    }

    fn line(&self, text: &str) {
        if self.quiet {
            return;
        }
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = writeln!(out, "{}", text);
    }

    pub fn operation_start(&self, target: &str, op: Operation) {
        self.line(&style(format!("Beginning {} [{}]", target, op)).bold().to_string());
    }

    pub fn command(&self, invocation: &Invocation, filter: Option<&Invocation>) {
        match filter {
            Some(f) => self.line(&format!("{} | {}", invocation, f)),
            None => self.line(&invocation.to_string()),
        }
    }

    pub fn operation_end(&self, target: &str, op: Operation, status: i32) {
        if status == 0 {
            self.line(&style(format!("{} [{}] Succeeded", target, op)).green().bold().to_string());
        } else {
            self.line(&style(format!("{} [{}] Failed", target, op)).red().bold().to_string());
        }
    }

    pub fn target_end(&self, target: &str, status: TargetStatus) {
        match status {
            TargetStatus::Succeeded => {
                self.line(&style(format!("{} Succeeded", target)).green().bold().to_string())
            }
            _ => self.line(&style(format!("{} Failed", target)).red().bold().to_string()),
        }
    }

    pub fn skipped(&self, target: &str, dependency: &str, reason: &str) {
        self.line(
            &style(format!("Skipping {}: dependency {} {}.", target, dependency, reason))
                .cyan()
                .bold()
                .to_string(),
        );
    }

    pub fn failure(&self, message: &str) {
        self.line(&style(message).red().bold().to_string());
    }

    pub fn coverage(&self, target: &str, check: &CoverageCheck, warn: Option<f64>, fail: Option<f64>) {
        let mut text = format!("{} coverage: {:.2}%", target, check.coverage);
        if check.failed {
            text.push_str(&format!(" is below the required {:.2}%", fail.unwrap_or_default()));
        } else if check.warned {
            text.push_str(&format!(" is below the expected {:.2}%", warn.unwrap_or_default()));
        }
        self.line(&coverage_style(check).apply_to(text).to_string());
    }

    pub fn build_settings(&self, target: &str, settings: &BuildSettings) {
        self.line(&style(format!("Build settings for {}", target)).bold().to_string());
        for (key, value) in settings.iter() {
            self.line(&format!("    {} = {}", key, value));
        }
    }

    /// Per-target results in declaration order, then the coverage table.
    pub fn final_report(&self, outcome: &RunOutcome) {
        self.line("");
        for run in &outcome.targets {
            let name = run.target.name();
            match run.target.status() {
                TargetStatus::Succeeded => {
                    self.line(&style(format!("{} succeeded.", name)).green().bold().to_string())
                }
                TargetStatus::Skipped => {
                    self.line(&style(format!("{} skipped.", name)).yellow().bold().to_string())
                }
                other => self.line(
                    &style(format!("{} {}.", name, other.as_str()))
                        .red()
                        .bold()
                        .to_string(),
                ),
            }
        }

        let measured: Vec<_> = outcome
            .targets
            .iter()
            .filter_map(|run| run.target.coverage.map(|c| (run, c)))
            .collect();
        if measured.is_empty() {
            return;
        }

        self.line("");
        self.line(&style("Code coverage").bold().underlined().to_string());
        for (run, coverage) in measured {
            let spec = &run.target.spec;
            let check = CoverageCheck::classify(coverage, spec.min_warn_coverage, spec.min_fail_coverage);
            self.coverage(&spec.name, &check, spec.min_warn_coverage, spec.min_fail_coverage);
        }
    }
}

/// Red below the fail threshold, yellow below the warn threshold
fn coverage_style(check: &CoverageCheck) -> Style {
    let style = if check.failed {
        Style::new().red()
    } else if check.warned {
        Style::new().yellow()
    } else {
        Style::new().green()
    };
    style.bold()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::TargetRun;
    use crate::target::{BuildTarget, Platform, TargetSpec};
    use chrono::Utc;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn plain_reporter() -> (Reporter, Captured) {
        console::set_colors_enabled(false);
        let captured = Captured::default();
        (Reporter::to_writer(captured.clone()), captured)
    }

    fn finished(name: &str, status: TargetStatus, warn: Option<f64>, coverage: Option<f64>) -> TargetRun {
        let spec = TargetSpec::new(name, name, Platform::Mac)
            .with_operations(&[Operation::Build, Operation::Codecov])
            .with_thresholds(warn, None);
        let mut target = BuildTarget::new(spec);
        if status == TargetStatus::Skipped {
            target.transition(TargetStatus::Skipped).unwrap();
        } else {
            target.transition(TargetStatus::Running).unwrap();
            target.transition(status).unwrap();
        }
        target.coverage = coverage;
        TargetRun {
            target,
            operations: Vec::new(),
        }
    }

    #[test]
    fn test_final_report_in_declaration_order() {
        let (reporter, captured) = plain_reporter();
        let now = Utc::now();
        let outcome = RunOutcome {
            run_id: "run".to_string(),
            started_at: now,
            finished_at: now,
            targets: vec![
                finished("Mac Framework", TargetStatus::Succeeded, Some(70.0), Some(65.3)),
                finished("Mac Test App", TargetStatus::Skipped, None, None),
                finished("iOS Framework", TargetStatus::Failed, None, Some(91.0)),
            ],
        };

        reporter.final_report(&outcome);

        assert_eq!(
            captured.lines(),
            vec![
                "",
                "Mac Framework succeeded.",
                "Mac Test App skipped.",
                "iOS Framework failed.",
                "",
                "Code coverage",
                "Mac Framework coverage: 65.30% is below the expected 70.00%",
                "iOS Framework coverage: 91.00%",
            ]
        );
    }

    #[test]
    fn test_coverage_lines() {
        let (reporter, captured) = plain_reporter();

        reporter.coverage("A", &CoverageCheck::classify(65.3, Some(70.0), None), Some(70.0), None);
        reporter.coverage("B", &CoverageCheck::classify(40.0, Some(70.0), Some(50.0)), Some(70.0), Some(50.0));
        reporter.coverage("C", &CoverageCheck::classify(80.0, Some(70.0), Some(50.0)), Some(70.0), Some(50.0));

        assert_eq!(
            captured.lines(),
            vec![
                "A coverage: 65.30% is below the expected 70.00%",
                "B coverage: 40.00% is below the required 50.00%",
                "C coverage: 80.00%",
            ]
        );
    }

    #[test]
    fn test_coverage_colors() {
        let warned = CoverageCheck::classify(65.3, Some(70.0), Some(50.0));
        let failed = CoverageCheck::classify(40.0, Some(70.0), Some(50.0));
        let passed = CoverageCheck::classify(80.0, Some(70.0), Some(50.0));
        assert_eq!(coverage_style(&warned), Style::new().yellow().bold());
        assert_eq!(coverage_style(&failed), Style::new().red().bold());
        assert_eq!(coverage_style(&passed), Style::new().green().bold());
    }

    #[test]
    fn test_quiet_writes_nothing() {
        let captured = Captured::default();
        let reporter = Reporter {
            quiet: true,
            ..Reporter::to_writer(captured.clone())
        };
        reporter.failure("boom");
        assert!(captured.lines().is_empty());
    }
}
