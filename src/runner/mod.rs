//! External tool invocation
//!
//! Every external tool (xcodebuild, xcrun, xcpretty, system_profiler) is
//! reached through the [`ToolRunner`] trait so the orchestration logic can be
//! exercised against [`crate::mock::MockRunner`] in tests.
//! - `SystemRunner`: spawns real processes
//! - `MockRunner`: records invocations and replays scripted output

use std::fmt;
use std::io;
use std::process::{Command, Stdio};

use tracing::debug;

/// A single external tool invocation (program plus argv, no shell).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Render as a copy-pasteable shell command line.
    pub fn command_line(&self) -> String {
        let mut line = shell_quote(&self.program);
        for arg in &self.args {
            line.push(' ');
            line.push_str(&shell_quote(arg));
        }
        line
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "\"\"".to_string();
    }
    let safe = s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@+".contains(c));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Captured result of a tool run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit status; -1 when the process was killed by a signal
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == 0
    }
}

/// Runner errors. A tool that starts and exits non-zero is NOT an error;
/// these cover failing to start or talk to the process at all.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Interface for invoking external tools
pub trait ToolRunner: Send + Sync {
    /// Run with output streamed to the console, optionally piping stdout
    /// through `filter`. Returns the pipeline's status as bash `pipefail`
    /// reports it: the last non-zero stage status, or 0.
    fn stream(&self, invocation: &Invocation, filter: Option<&Invocation>) -> Result<i32, RunnerError>;

    /// Run to completion and capture stdout/stderr.
    fn capture(&self, invocation: &Invocation) -> Result<ToolOutput, RunnerError>;
}

/// Runner that spawns real processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

fn exit_status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Status of a pipeline under `set -o pipefail`: the rightmost non-zero stage
pub fn pipeline_status(stages: &[i32]) -> i32 {
    stages.iter().rev().copied().find(|c| *c != 0).unwrap_or(0)
}

impl ToolRunner for SystemRunner {
    fn stream(&self, invocation: &Invocation, filter: Option<&Invocation>) -> Result<i32, RunnerError> {
        let spawn_err = |program: &str| {
            let program = program.to_string();
            move |source| RunnerError::Spawn { program, source }
        };
        let wait_err = |program: &str| {
            let program = program.to_string();
            move |source| RunnerError::Io { program, source }
        };

        let Some(filter) = filter else {
            debug!(command = %invocation, "running");
            let status = invocation
                .to_command()
                .status()
                .map_err(spawn_err(&invocation.program))?;
            return Ok(exit_status_code(status));
        };

        debug!(command = %invocation, filter = %filter, "running through filter");
        let mut producer = invocation
            .to_command()
            .stdout(Stdio::piped())
            .spawn()
            .map_err(spawn_err(&invocation.program))?;

        let Some(pipe) = producer.stdout.take() else {
            let _ = producer.kill();
            return Err(RunnerError::Io {
                program: invocation.program.clone(),
                source: io::Error::new(io::ErrorKind::BrokenPipe, "stdout was not captured"),
            });
        };

        let consumer = filter
            .to_command()
            .stdin(Stdio::from(pipe))
            .spawn();
        let mut consumer = match consumer {
            Ok(child) => child,
            Err(source) => {
                let _ = producer.kill();
                let _ = producer.wait();
                return Err(RunnerError::Spawn {
                    program: filter.program.clone(),
                    source,
                });
            }
        };

        let producer_status = producer.wait().map_err(wait_err(&invocation.program))?;
        let consumer_status = consumer.wait().map_err(wait_err(&filter.program))?;

        Ok(pipeline_status(&[
            exit_status_code(producer_status),
            exit_status_code(consumer_status),
        ]))
    }

    fn capture(&self, invocation: &Invocation) -> Result<ToolOutput, RunnerError> {
        debug!(command = %invocation, "capturing");
        let output = invocation
            .to_command()
            .stdin(Stdio::null())
            .output()
            .map_err(|source| RunnerError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        Ok(ToolOutput {
            status: exit_status_code(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
