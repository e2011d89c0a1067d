//! Mock tool runner
//!
//! Records every invocation and answers with scripted output so the
//! orchestrator, locator and coverage extractor can be tested without Xcode.
//!
//! Rules are matched against the rendered command line; the first rule whose
//! pattern is a substring wins. Unmatched invocations succeed with empty
//! output.

use std::sync::{Mutex, MutexGuard};

use crate::runner::{Invocation, RunnerError, ToolOutput, ToolRunner};

/// How an invocation was made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Stream,
    Capture,
}

/// A recorded invocation
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub invocation: Invocation,
    pub filter: Option<Invocation>,
}

impl RecordedCall {
    pub fn command_line(&self) -> String {
        self.invocation.command_line()
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Output(ToolOutput),
    SpawnError,
    Panic(String),
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    reply: Reply,
}

#[derive(Debug, Default)]
struct MockState {
    rules: Vec<Rule>,
    calls: Vec<RecordedCall>,
}

/// Scripted [`ToolRunner`] for tests
#[derive(Debug, Default)]
pub struct MockRunner {
    state: Mutex<MockState>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking rule poisons the mutex; the data is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push_rule(&self, pattern: &str, reply: Reply) {
        self.lock().rules.push(Rule {
            pattern: pattern.to_string(),
            reply,
        });
    }

    /// Answer matching invocations with `output`
    pub fn respond(self, pattern: &str, output: ToolOutput) -> Self {
        self.push_rule(pattern, Reply::Output(output));
        self
    }

    /// Matching invocations exit with `status` and no output
    pub fn exit_with(self, pattern: &str, status: i32) -> Self {
        self.respond(pattern, ToolOutput::failure(status, ""))
    }

    /// Matching invocations fail to spawn
    pub fn spawn_error(self, pattern: &str) -> Self {
        self.push_rule(pattern, Reply::SpawnError);
        self
    }

    /// Matching invocations panic inside the runner
    pub fn panic_on(self, pattern: &str, message: &str) -> Self {
        self.push_rule(pattern, Reply::Panic(message.to_string()));
        self
    }

    /// All calls recorded so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Rendered command lines of all recorded calls
    pub fn command_lines(&self) -> Vec<String> {
        self.lock().calls.iter().map(RecordedCall::command_line).collect()
    }

    /// Number of recorded calls whose command line contains `pattern`
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.command_line().contains(pattern))
            .count()
    }

    fn reply_for(&self, kind: CallKind, invocation: &Invocation, filter: Option<&Invocation>) -> Reply {
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            kind,
            invocation: invocation.clone(),
            filter: filter.cloned(),
        });
        let line = invocation.command_line();
        state
            .rules
            .iter()
            .find(|r| line.contains(&r.pattern))
            .map(|r| r.reply.clone())
            .unwrap_or_else(|| Reply::Output(ToolOutput::default()))
    }

    fn resolve(reply: Reply, invocation: &Invocation) -> Result<ToolOutput, RunnerError> {
        match reply {
            Reply::Output(output) => Ok(output),
            Reply::SpawnError => Err(RunnerError::Spawn {
                program: invocation.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock spawn failure"),
            }),
            Reply::Panic(message) => panic!("{}", message),
        }
    }
}

impl ToolRunner for MockRunner {
    fn stream(&self, invocation: &Invocation, filter: Option<&Invocation>) -> Result<i32, RunnerError> {
        let reply = self.reply_for(CallKind::Stream, invocation, filter);
        Self::resolve(reply, invocation).map(|o| o.status)
    }

    fn capture(&self, invocation: &Invocation) -> Result<ToolOutput, RunnerError> {
        let reply = self.reply_for(CallKind::Capture, invocation, None);
        Self::resolve(reply, invocation)
    }
}
