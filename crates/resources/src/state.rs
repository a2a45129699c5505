// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-attempt rollback bookkeeping for lock-state transforms
//!
//! One `ResourceLockState` exists per currently-executing transform. It
//! records the locks the attempt newly acquired or released so the
//! coordinator can undo the attempt atomically on failure or retry.

use crate::lock::ResourceLock;
use std::sync::{Arc, Mutex};
use tracing::warn;

#[derive(Default)]
struct StateInner {
    /// Locks newly acquired by this attempt, in acquisition order
    locked: Vec<Arc<dyn ResourceLock>>,
    /// Locks released by this attempt (rollback releases excluded)
    unlocked: Vec<Arc<dyn ResourceLock>>,
    rolling_back: bool,
}

/// Bookkeeping for one transform attempt
///
/// Created fresh by the coordinator before each attempt and discarded after
/// it returns. At that point either every registered acquisition is still
/// held (finished) or all of them have been rolled back (failed/retry).
#[derive(Default)]
pub struct ResourceLockState {
    inner: Mutex<StateInner>,
}

impl ResourceLockState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a lock newly acquired by the current attempt.
    ///
    /// An acquisition cancels out a release of the same lock registered
    /// earlier in the attempt.
    pub fn register_locked(&self, lock: Arc<dyn ResourceLock>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.rolling_back {
            return;
        }
        if !remove_by_identity(&mut inner.unlocked, &lock) {
            inner.locked.push(lock);
        }
    }

    /// Record a lock released by the current attempt.
    ///
    /// A release cancels out an acquisition of the same lock registered
    /// earlier in the attempt; a net-zero lock fires no listeners.
    pub fn register_unlocked(&self, lock: Arc<dyn ResourceLock>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.rolling_back {
            return;
        }
        if !remove_by_identity(&mut inner.locked, &lock) {
            inner.unlocked.push(lock);
        }
    }

    /// Roll back the attempt: release, in reverse acquisition order, exactly
    /// the locks it newly acquired.
    ///
    /// Locks held before the attempt began are left untouched. Release
    /// failures during rollback are logged and skipped so the remaining
    /// locks still get released.
    pub fn release_locks(&self) {
        let locked = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.rolling_back = true;
            std::mem::take(&mut inner.locked)
        };
        for lock in locked.iter().rev() {
            if let Err(err) = lock.unlock() {
                warn!(lock = lock.display_name(), %err, "failed to roll back resource lock");
            }
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.rolling_back = false;
    }

    /// Take the releases recorded by this attempt, for listener fan-out.
    pub(crate) fn take_unlocked(&self) -> Vec<Arc<dyn ResourceLock>> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut inner.unlocked)
    }

    /// Number of acquisitions this attempt currently has registered
    pub(crate) fn locked_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .locked
            .len()
    }
}

/// Remove `target` from `locks` by pointer identity.
fn remove_by_identity(locks: &mut Vec<Arc<dyn ResourceLock>>, target: &Arc<dyn ResourceLock>) -> bool {
    match locks
        .iter()
        .position(|lock| std::ptr::addr_eq(Arc::as_ptr(lock), Arc::as_ptr(target)))
    {
        Some(index) => {
            locks.remove(index);
            true
        }
        None => false,
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
