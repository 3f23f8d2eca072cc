//! Mock process runner for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::traits::{CommandOutput, CommandRunner, ExecError, Invocation, OutputMode};

/// Mock runner for unit testing session and stage logic.
///
/// Returns scripted outcomes in FIFO order and records every invocation
/// so tests can assert on the exact argument vectors. Clones share the
/// same queue and log.
#[derive(Clone)]
pub struct MockRunner {
    /// Queued outcomes to return on each run.
    outcomes: Arc<Mutex<VecDeque<Result<CommandOutput, ExecError>>>>,
    /// Captured invocations.
    invocation_log: Arc<Mutex<Vec<Invocation>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(VecDeque::new())),
            invocation_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a raw outcome to be returned on the next run.
    pub fn queue_outcome(&self, outcome: Result<CommandOutput, ExecError>) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    /// Queue a successful exit with the given stdout.
    pub fn queue_success(&self, stdout: &str) {
        self.queue_outcome(Ok(CommandOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        }));
    }

    /// Queue a non-zero exit with empty output.
    pub fn queue_exit(&self, code: i32) {
        self.queue_exit_with(code, "", "");
    }

    /// Queue a non-zero exit with explicit output.
    pub fn queue_exit_with(&self, code: i32, stdout: &str, stderr: &str) {
        self.queue_outcome(Ok(CommandOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code: Some(code),
        }));
    }

    /// Get all captured invocations.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocation_log.lock().unwrap().clone()
    }

    /// Clear captured invocations.
    pub fn clear_invocations(&self) {
        self.invocation_log.lock().unwrap().clear();
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for MockRunner {
    fn run_with(
        &self,
        invocation: &Invocation,
        _mode: OutputMode,
    ) -> Result<CommandOutput, ExecError> {
        self.invocation_log.lock().unwrap().push(invocation.clone());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(ExecError::LaunchFailed {
                    program: invocation.program_name(),
                    message: "no scripted outcome queued".to_string(),
                })
            })
    }
}
