//! Operator interaction capability.
//!
//! Some steps cannot proceed without a human: staging the loader file,
//! or moving the device by hand when ADB is skipped. Those steps block
//! on this trait instead of reading stdin directly, so front ends and
//! tests can supply their own behavior.

use std::io::{self, BufRead};
use std::sync::{Arc, Mutex};

/// Blocking confirmation gate.
pub trait OperatorPrompt: Send + Sync {
    /// Present `message` and block until the operator confirms.
    ///
    /// An error means the operator channel is gone (e.g. stdin closed)
    /// and the session cannot continue unattended steps.
    fn await_confirmation(&self, message: &str) -> io::Result<()>;
}

/// Prompt reading confirmations from stdin.
pub struct StdinPrompt;

impl OperatorPrompt for StdinPrompt {
    fn await_confirmation(&self, message: &str) -> io::Result<()> {
        println!("{message}");
        println!("\nPress Enter when ready...");
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stdin closed while waiting for operator",
            ));
        }
        Ok(())
    }
}

/// Mock prompt for unit testing session logic.
///
/// Records every message and confirms immediately, optionally failing
/// after a fixed number of confirmations so tests of retry loops
/// terminate. Clones share the same log and budget.
#[derive(Clone)]
pub struct MockPrompt {
    messages: Arc<Mutex<Vec<String>>>,
    remaining: Arc<Mutex<Option<usize>>>,
}

impl MockPrompt {
    /// Confirm every prompt.
    pub fn always_confirm() -> Self {
        Self {
            messages: Arc::new(Mutex::new(Vec::new())),
            remaining: Arc::new(Mutex::new(None)),
        }
    }

    /// Confirm `n` prompts, then report the operator channel closed.
    pub fn confirm_times(n: usize) -> Self {
        Self {
            messages: Arc::new(Mutex::new(Vec::new())),
            remaining: Arc::new(Mutex::new(Some(n))),
        }
    }

    /// Get all recorded prompt messages.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl OperatorPrompt for MockPrompt {
    fn await_confirmation(&self, message: &str) -> io::Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        let mut remaining = self.remaining.lock().unwrap();
        match remaining.as_mut() {
            None => Ok(()),
            Some(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "operator channel closed",
            )),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
        }
    }
}
