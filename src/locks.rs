//! Per-identity locks.
//!
//! Two runs for the same subscription in one process would only race each
//! other into conflict and not-found responses, which the reconciler already
//! tolerates. Holding a lock per identity saves those wasted round trips.

use crate::cancel::{CancelToken, Interrupt};
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Longest single condvar wait before re-checking the cancel token.
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Set of identities currently held, with a condvar for waiters.
#[derive(Default)]
pub struct IdentityLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Keeps an identity locked until dropped.
pub struct IdentityGuard<'a> {
    locks: &'a IdentityLocks,
    key: String,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `key` is free, then hold it.
    ///
    /// Cancelling `cancel` or passing its deadline abandons the wait.
    pub fn lock(&self, key: &str, cancel: &CancelToken) -> Result<IdentityGuard<'_>, Interrupt> {
        let mut held = self.held.lock();
        while held.contains(key) {
            cancel.check()?;
            let wait = match cancel.deadline() {
                Some(deadline) => {
                    CANCEL_POLL.min(deadline.saturating_duration_since(Instant::now()))
                }
                None => CANCEL_POLL,
            };
            self.released.wait_for(&mut held, wait);
        }
        held.insert(key.to_string());

        Ok(IdentityGuard {
            locks: self,
            key: key.to_string(),
        })
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.lock().contains(key)
    }

    /// Number of identities currently held.
    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }
}

impl Drop for IdentityGuard<'_> {
    fn drop(&mut self) {
        self.locks.held.lock().remove(&self.key);
        self.locks.released.notify_all();
    }
}
