// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The lock coordinator: the single serialization point for lock-state
//! mutation in a build session
//!
//! Every change to resource-lock ownership happens inside a transform run by
//! [`LockCoordinator::with_state_lock`] (or one of its convenience wrappers).
//! Transforms are strictly serialized, acquisition is all-or-nothing, and a
//! transform that cannot get everything it wants gives everything back before
//! blocking, so no thread ever waits while holding a partial set of locks.

use crate::error::CoordinationError;
use crate::lock::ResourceLock;
use crate::state::ResourceLockState;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use tracing::trace;

/// Outcome of one transform attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Every needed lock was acquired; keep them and give up the state lock.
    Finished,
    /// Acquisition failed; roll back this attempt and give up.
    Failed,
    /// Acquisition failed; roll back and run the transform again, from
    /// scratch, once the lock state changes.
    Retry,
}

/// Outcome of one [`LockCoordinator::run_until_finished`] attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationResult<T> {
    /// The action completed, carrying its result (`()` when there is none).
    Finished(T),
    /// Run the action again once the lock state changes.
    Retry,
}

/// Callback invoked when a resource lock is released
///
/// Listeners run synchronously, in registration order, while the state lock
/// is held. They must not block or call back into the coordinator.
pub type LockReleaseListener = Arc<dyn Fn(&dyn ResourceLock) + Send + Sync>;

struct ActiveTransform {
    holder: ThreadId,
    state: Arc<ResourceLockState>,
}

#[derive(Default)]
struct Shared {
    /// Set while a transform runs; `holder` is the state-lock owner.
    active: Option<ActiveTransform>,
    listeners: Vec<LockReleaseListener>,
    /// Bumped on every change notification; retry waiters block on it.
    epoch: u64,
}

/// Process-wide coordination core for resource locks
///
/// One instance per build session. Owns the state lock (one transform at a
/// time), the condition variable retry waiters block on, and the
/// lock-release listener registry.
pub struct LockCoordinator {
    shared: Mutex<Shared>,
    state_changed: Condvar,
}

impl LockCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            shared: Mutex::new(Shared::default()),
            state_changed: Condvar::new(),
        })
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The state of the transform currently running on this thread.
    ///
    /// `Some` if and only if the calling thread holds the state lock inside
    /// a transform. Lock implementations use this to register their own
    /// acquisitions and releases without the state being threaded through
    /// every call.
    pub fn get_current(&self) -> Option<Arc<ResourceLockState>> {
        let shared = self.shared();
        shared
            .active
            .as_ref()
            .filter(|active| active.holder == thread::current().id())
            .map(|active| Arc::clone(&active.state))
    }

    pub(crate) fn current_state(&self) -> Result<Arc<ResourceLockState>, CoordinationError> {
        self.get_current().ok_or(CoordinationError::StateLockNotHeld)
    }

    /// Fail unless the calling thread holds the state lock inside a transform.
    ///
    /// Lock implementations call this from their mutation paths to catch
    /// callers that bypass the coordination discipline.
    pub fn assert_has_state_lock(&self) -> Result<(), CoordinationError> {
        self.current_state().map(|_| ())
    }

    /// Atomically change the state of resource locks.
    ///
    /// Blocks until no other transform is running, installs a fresh
    /// [`ResourceLockState`], and runs `transform`. The returned
    /// [`Disposition`] decides what happens next: `Finished` keeps the
    /// attempt's acquisitions and returns `Ok(true)`; `Failed` rolls them
    /// back and returns `Ok(false)`; `Retry` rolls them back, blocks until a
    /// change notification, then starts the transform over with fresh state.
    ///
    /// An `Err` from the transform (or a panic) also rolls the attempt back
    /// before propagating, so no locks leak on an abnormal exit.
    ///
    /// Nested calls from inside a transform are not supported and deadlock.
    pub fn with_state_lock<E>(
        &self,
        mut transform: impl FnMut(&ResourceLockState) -> Result<Disposition, E>,
    ) -> Result<bool, E> {
        loop {
            let held = self.enter();
            match transform(held.state()) {
                Ok(Disposition::Finished) => {
                    held.commit();
                    return Ok(true);
                }
                Ok(Disposition::Failed) => {
                    held.roll_back();
                    return Ok(false);
                }
                Ok(Disposition::Retry) => held.wait_for_change(),
                Err(err) => {
                    held.roll_back();
                    return Err(err);
                }
            }
        }
    }

    /// Run `action` under the state lock until it reports completion.
    ///
    /// Retry and rollback semantics are identical to
    /// [`with_state_lock`](Self::with_state_lock); the carried value of
    /// [`OperationResult::Finished`] is returned to the caller.
    pub fn run_until_finished<T, E>(
        &self,
        mut action: impl FnMut(&ResourceLockState) -> Result<OperationResult<T>, E>,
    ) -> Result<T, E> {
        loop {
            let held = self.enter();
            match action(held.state()) {
                Ok(OperationResult::Finished(value)) => {
                    held.commit();
                    return Ok(value);
                }
                Ok(OperationResult::Retry) => held.wait_for_change(),
                Err(err) => {
                    held.roll_back();
                    return Err(err);
                }
            }
        }
    }

    /// Run `action` exactly once under the state lock, with no retry.
    ///
    /// For callers that already know their resources are available, or that
    /// only need the mutual-exclusion guarantee.
    pub fn run<T>(&self, action: impl FnOnce() -> T) -> T {
        let held = self.enter();
        let result = action();
        held.commit();
        result
    }

    /// Notify all threads blocked after a `Retry` disposition that the lock
    /// state has changed.
    ///
    /// This is a broadcast, not a signal: every blocked transform wakes,
    /// reacquires the state lock one at a time, and redoes its acquisition
    /// from scratch. Must be called by any code that released a resource
    /// lock while the state lock is held; the lock implementations in this
    /// crate arrange it through their registered releases.
    pub fn notify_state_change(&self) {
        let mut shared = self.shared();
        shared.epoch = shared.epoch.wrapping_add(1);
        drop(shared);
        self.state_changed.notify_all();
    }

    /// Register a listener invoked whenever a lock is released.
    pub fn add_lock_release_listener(&self, listener: LockReleaseListener) {
        self.shared().listeners.push(listener);
    }

    /// Remove a previously registered listener, by identity.
    pub fn remove_lock_release_listener(&self, listener: &LockReleaseListener) {
        let mut shared = self.shared();
        if let Some(index) = shared
            .listeners
            .iter()
            .position(|registered| std::ptr::addr_eq(Arc::as_ptr(registered), Arc::as_ptr(listener)))
        {
            shared.listeners.remove(index);
        }
    }

    /// Block until no transform is active, then install a fresh state with
    /// the calling thread as holder.
    fn enter(&self) -> HeldStateLock<'_> {
        let mut shared = self.shared();
        while shared.active.is_some() {
            shared = self
                .state_changed
                .wait(shared)
                .unwrap_or_else(|e| e.into_inner());
        }
        let state = Arc::new(ResourceLockState::new());
        shared.active = Some(ActiveTransform {
            holder: thread::current().id(),
            state: Arc::clone(&state),
        });
        drop(shared);
        HeldStateLock {
            coordinator: self,
            state,
            released: false,
        }
    }

    /// Fan out this attempt's recorded releases to listeners, then clear the
    /// active transform and wake entry waiters. Returns the epoch observed
    /// at clearing time.
    fn finish(&self, state: &ResourceLockState) -> u64 {
        let released = state.take_unlocked();
        if !released.is_empty() {
            // Snapshot so a listener touching the registry cannot deadlock.
            let listeners = self.shared().listeners.clone();
            for lock in &released {
                for listener in &listeners {
                    listener(lock.as_ref());
                }
            }
        }
        let mut shared = self.shared();
        if !released.is_empty() {
            shared.epoch = shared.epoch.wrapping_add(1);
        }
        let epoch = shared.epoch;
        shared.active = None;
        drop(shared);
        self.state_changed.notify_all();
        epoch
    }
}

/// RAII scope for one transform attempt.
///
/// The drop path covers panicking transforms: the attempt is rolled back and
/// the state lock given up before unwinding continues, so other waiters are
/// not deadlocked by an abnormal exit.
struct HeldStateLock<'a> {
    coordinator: &'a LockCoordinator,
    state: Arc<ResourceLockState>,
    released: bool,
}

impl HeldStateLock<'_> {
    fn state(&self) -> &ResourceLockState {
        &self.state
    }

    /// Keep this attempt's acquisitions and give up the state lock.
    fn commit(mut self) {
        self.released = true;
        self.coordinator.finish(&self.state);
    }

    /// Undo this attempt's acquisitions, then give up the state lock.
    fn roll_back(mut self) {
        self.released = true;
        self.state.release_locks();
        self.coordinator.finish(&self.state);
    }

    /// Undo this attempt's acquisitions, give up the state lock, and block
    /// until the next change notification.
    fn wait_for_change(mut self) {
        self.released = true;
        self.state.release_locks();
        let epoch = self.coordinator.finish(&self.state);
        trace!("retry: blocking until resource lock state changes");
        let mut shared = self.coordinator.shared();
        while shared.epoch == epoch {
            shared = self
                .coordinator
                .state_changed
                .wait(shared)
                .unwrap_or_else(|e| e.into_inner());
        }
        drop(shared);
        trace!("retry: resource lock state changed, redoing transform");
    }
}

impl Drop for HeldStateLock<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.state.release_locks();
            self.coordinator.finish(&self.state);
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
