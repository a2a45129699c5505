// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource lock contract and the exclusive lock implementation
//!
//! A resource lock is a capability object for one logical build resource
//! (a project mutex, an output directory, a worker slot). No method here
//! blocks; all blocking is centralized in the coordinator.

use crate::coordinator::LockCoordinator;
use crate::error::CoordinationError;
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, ThreadId};
use tracing::debug;

/// Contract for one lockable resource
///
/// Ownership may only change while the calling thread holds the state lock
/// inside a transform; implementations enforce this through the
/// coordinator's current-state check.
pub trait ResourceLock: Send + Sync {
    /// Stable name for diagnostics
    fn display_name(&self) -> &str;

    /// Attempt to acquire the lock for the calling thread, without blocking.
    ///
    /// Returns `Ok(true)` if the thread now owns the lock (or already did).
    /// Fresh acquisitions are recorded with the current transform's
    /// [`ResourceLockState`](crate::state::ResourceLockState) so they can be
    /// rolled back.
    fn try_lock(&self) -> Result<bool, CoordinationError>;

    /// Release the lock.
    ///
    /// Only the owning thread may release a held lock; releasing an unheld
    /// lock is a no-op. The release is recorded with the current transform's
    /// state so waiters get a change notification and release listeners run.
    fn unlock(&self) -> Result<(), CoordinationError>;

    /// Whether any thread currently owns the lock
    fn is_locked(&self) -> bool;

    /// Whether the calling thread currently owns the lock
    fn is_locked_by_current_thread(&self) -> bool;
}

/// An exclusive lock on one named build resource
///
/// Created once per logical resource for the life of the build session and
/// acquired/released many times during it.
pub struct ExclusiveLock {
    name: String,
    coordinator: Arc<LockCoordinator>,
    owner: Mutex<Option<ThreadId>>,
    me: Weak<ExclusiveLock>,
}

impl ExclusiveLock {
    pub fn new(coordinator: Arc<LockCoordinator>, name: impl Into<String>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            name: name.into(),
            coordinator,
            owner: Mutex::new(None),
            me: me.clone(),
        })
    }

    fn owner(&self) -> Option<ThreadId> {
        *self.owner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handle(&self) -> Option<Arc<dyn ResourceLock>> {
        self.me.upgrade().map(|lock| lock as Arc<dyn ResourceLock>)
    }
}

impl ResourceLock for ExclusiveLock {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn try_lock(&self) -> Result<bool, CoordinationError> {
        let state = self.coordinator.current_state()?;
        let mut owner = self.owner.lock().unwrap_or_else(|e| e.into_inner());
        match *owner {
            Some(id) if id == thread::current().id() => Ok(true),
            Some(_) => Ok(false),
            None => {
                *owner = Some(thread::current().id());
                drop(owner);
                debug!(lock = %self.name, "acquired resource lock");
                if let Some(handle) = self.handle() {
                    state.register_locked(handle);
                }
                Ok(true)
            }
        }
    }

    fn unlock(&self) -> Result<(), CoordinationError> {
        let state = self.coordinator.current_state()?;
        let mut owner = self.owner.lock().unwrap_or_else(|e| e.into_inner());
        match *owner {
            None => Ok(()),
            Some(id) if id == thread::current().id() => {
                *owner = None;
                drop(owner);
                debug!(lock = %self.name, "released resource lock");
                if let Some(handle) = self.handle() {
                    state.register_unlocked(handle);
                }
                Ok(())
            }
            Some(_) => Err(CoordinationError::HeldByOtherThread {
                name: self.name.clone(),
            }),
        }
    }

    fn is_locked(&self) -> bool {
        self.owner().is_some()
    }

    fn is_locked_by_current_thread(&self) -> bool {
        self.owner() == Some(thread::current().id())
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
