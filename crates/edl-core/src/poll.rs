//! Cooperative polling with operator cancellation.
//!
//! The only timing construct in the crate: a fixed-interval retry loop
//! with no overall deadline. A device can legitimately take minutes to
//! re-enumerate, so giving up is the operator's call, not a timer's.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
#[error("wait for {target} cancelled by operator")]
pub struct WaitCancelled {
    pub target: String,
}

/// Shared cancellation flag, typically tripped by a Ctrl+C handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Poll `detect` until it yields a value.
///
/// Returns the first `Some` produced. Sleeps `interval` between
/// attempts and checks `cancel` before every attempt and every sleep.
/// Never calls `detect` again after it has produced a value.
pub fn wait_until<T, F>(
    target: &str,
    mut detect: F,
    interval: Duration,
    cancel: &CancelToken,
) -> Result<T, WaitCancelled>
where
    F: FnMut() -> Option<T>,
{
    let mut attempts: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(WaitCancelled {
                target: target.to_string(),
            });
        }
        if let Some(value) = detect() {
            debug!(target = %target, attempts, "Detected");
            return Ok(value);
        }
        attempts += 1;
        debug!(target = %target, attempts, "Not present, sleeping");
        if cancel.is_cancelled() {
            return Err(WaitCancelled {
                target: target.to_string(),
            });
        }
        thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returns_first_present_value() {
        let mut results = vec![None, None, Some("COM7")].into_iter();
        let mut calls = 0;
        let cancel = CancelToken::new();

        let port = wait_until(
            "EDL device",
            || {
                calls += 1;
                results.next().unwrap()
            },
            Duration::ZERO,
            &cancel,
        )
        .unwrap();

        assert_eq!(port, "COM7");
        // Two misses then a hit; the detector is never called again.
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_cancel_before_first_attempt() {
        let cancel = CancelToken::new();
        cancel.cancel();

        let result: Result<(), _> =
            wait_until("EDL device", || panic!("must not poll"), Duration::ZERO, &cancel);

        let err = result.unwrap_err();
        assert_eq!(err.target, "EDL device");
    }

    #[test]
    fn test_cancel_mid_wait() {
        let cancel = CancelToken::new();
        let mut calls = 0;

        let result: Result<(), _> = wait_until(
            "fastboot device",
            || {
                calls += 1;
                if calls == 3 {
                    cancel.cancel();
                }
                None
            },
            Duration::ZERO,
            &cancel,
        );

        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
