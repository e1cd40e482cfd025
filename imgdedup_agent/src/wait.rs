use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    /// `None` waits for as long as it takes.
    pub timeout: Option<Duration>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("condition not met within {0:?}")]
    TimedOut(Duration),
    #[error("wait cancelled")]
    Cancelled,
}

/// Re-runs `check` until it returns true, sleeping `policy.interval` between
/// attempts so whoever else shares the thread gets a turn.
pub fn wait_until(
    policy: WaitPolicy,
    cancel: &CancelToken,
    mut check: impl FnMut() -> bool,
) -> Result<(), WaitError> {
    let start = Instant::now();
    loop {
        if check() {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled);
        }
        if let Some(timeout) = policy.timeout {
            if start.elapsed() >= timeout {
                return Err(WaitError::TimedOut(timeout));
            }
        }
        thread::sleep(policy.interval);
    }
}
