//! Cancellation for blocking waits.
//!
//! A `CancelToken` wraps a channel that is never sent on: cancelling drops
//! the only sender, which wakes every sleeper at once through the
//! disconnect. An optional deadline bounds the whole operation.

use crate::error::{ReconcileError, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a wait stopped early.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    DeadlineExceeded,
}

impl Interrupt {
    /// Convert into the crate error for the given stage.
    pub fn into_error(self, stage: &'static str) -> ReconcileError {
        match self {
            Interrupt::Cancelled => ReconcileError::Cancelled { stage },
            Interrupt::DeadlineExceeded => ReconcileError::DeadlineExceeded { stage },
        }
    }
}

/// Cloneable abort handle shared by one reconciliation.
#[derive(Clone)]
pub struct CancelToken {
    sender: Arc<Mutex<Option<Sender<()>>>>,
    receiver: Receiver<()>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that only stops when `cancel` is called.
    pub fn new() -> Self {
        let (sender, receiver) = bounded(0);
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
            receiver,
            deadline: None,
        }
    }

    /// A token that also expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().child_with_deadline(Instant::now() + timeout)
    }

    /// Same cancellation signal, with a (possibly tighter) deadline.
    pub fn child_with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            sender: Arc::clone(&self.sender),
            receiver: self.receiver.clone(),
            deadline: Some(deadline),
        }
    }

    /// Wake every waiter sharing this token.
    pub fn cancel(&self) {
        self.sender.lock().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.sender.lock().is_none()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails if the token was cancelled or its deadline has passed.
    pub fn check(&self) -> std::result::Result<(), Interrupt> {
        if self.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Interrupt::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Sleep for `duration` unless interrupted first.
    pub fn sleep(&self, duration: Duration) -> std::result::Result<(), Interrupt> {
        self.check()?;

        let (wait, hits_deadline) = match self.deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining <= duration {
                    (remaining, true)
                } else {
                    (duration, false)
                }
            }
            None => (duration, false),
        };

        match self.receiver.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) if hits_deadline => Err(Interrupt::DeadlineExceeded),
            Err(RecvTimeoutError::Timeout) => Ok(()),
            // Nothing is ever sent; any wakeup means the sender was dropped.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Err(Interrupt::Cancelled),
        }
    }

    /// `sleep` mapped into the crate error for `stage`.
    pub fn sleep_or_fail(&self, duration: Duration, stage: &'static str) -> Result<()> {
        self.sleep(duration).map_err(|i| i.into_error(stage))
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
