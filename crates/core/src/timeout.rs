//! Deadline-bounded execution with cooperative cancellation.
//!
//! [`run_with_timeout`] runs a unit of work on its own thread and waits for
//! it up to a deadline. When the deadline fires first the caller gets
//! [`DeadlineError::Elapsed`] and the unit's [`Cancellation`] is tripped.
//! The unit is never killed: if it does not poll its cancellation it keeps
//! running in the background until it finishes on its own, and its result is
//! dropped. Callers accept that leak in exchange for a bounded wait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Cancellation signal shared between a caller and a unit of work.
///
/// Cancelled once either [`cancel`](Self::cancel) is called or the optional
/// deadline passes.
#[derive(Debug, Clone)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
    parent: Option<Arc<Cancellation>>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    /// A signal with no deadline.
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: None,
            parent: None,
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::new()
        }
    }

    /// Derive a child signal that trips when this one does or when
    /// `timeout` elapses, whichever comes first. Cancelling the child does
    /// not affect the parent.
    pub fn child(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < candidate => parent,
            _ => candidate,
        };
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
            parent: Some(Arc::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return true;
        }
        self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    /// Time left before the deadline, `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// Why [`run_with_timeout`] returned without the unit's result.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DeadlineError {
    #[error("timed out after {}ms", .0.as_millis())]
    Elapsed(Duration),

    #[error("unit of work panicked before completing")]
    Panicked,

    #[error("failed to start unit of work: {0}")]
    Spawn(String),
}

/// Run `work` under `timeout`.
///
/// `work` receives a [`Cancellation`] that trips at the deadline and should
/// poll it. Whatever `work` returns (including its own `Result`) is passed
/// through unchanged when it finishes in time.
pub fn run_with_timeout<T, F>(timeout: Duration, work: F) -> Result<T, DeadlineError>
where
    T: Send + 'static,
    F: FnOnce(Cancellation) -> T + Send + 'static,
{
    run_with_cancellation(&Cancellation::new(), timeout, work)
}

/// Like [`run_with_timeout`], but the unit's signal is also tripped when
/// `parent` is.
pub fn run_with_cancellation<T, F>(
    parent: &Cancellation,
    timeout: Duration,
    work: F,
) -> Result<T, DeadlineError>
where
    T: Send + 'static,
    F: FnOnce(Cancellation) -> T + Send + 'static,
{
    let cancel = parent.child(timeout);
    let worker_cancel = cancel.clone();
    // Capacity 1 so an abandoned unit can still deliver its result and exit.
    let (tx, rx) = mpsc::sync_channel(1);

    thread::Builder::new()
        .name("tenet-bounded".to_string())
        .spawn(move || {
            let _ = tx.send(work(worker_cancel));
        })
        .map_err(|e| DeadlineError::Spawn(e.to_string()))?;

    let wait = cancel.remaining().unwrap_or(timeout);
    match rx.recv_timeout(wait) {
        Ok(value) => Ok(value),
        Err(RecvTimeoutError::Timeout) => {
            cancel.cancel();
            Err(DeadlineError::Elapsed(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => Err(DeadlineError::Panicked),
    }
}
