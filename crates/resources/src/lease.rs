// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-lease pool: a capacity-limited family of resource locks
//!
//! Execution slots are modeled as leases drawn from a fixed-size pool. Each
//! lease is an ordinary [`ResourceLock`], so build tasks acquire worker
//! slots with the same all-or-nothing transform protocol as any other
//! resource.

use crate::coordinator::LockCoordinator;
use crate::error::CoordinationError;
use crate::lock::ResourceLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, ThreadId};
use tracing::debug;

/// A fixed-capacity pool of worker leases
pub struct LeasePool {
    name: String,
    max_leases: u32,
    coordinator: Arc<LockCoordinator>,
    in_use: Mutex<u32>,
    leases_created: AtomicU32,
}

impl LeasePool {
    pub fn new(
        coordinator: Arc<LockCoordinator>,
        name: impl Into<String>,
        max_leases: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            max_leases,
            coordinator,
            in_use: Mutex::new(0),
            leases_created: AtomicU32::new(0),
        })
    }

    /// Create a lease handle drawing from this pool.
    ///
    /// Handles are created up front (one per prospective holder) and
    /// acquired/released many times; creation itself consumes no capacity.
    pub fn new_lease(self: &Arc<Self>) -> Arc<WorkerLease> {
        let number = self.leases_created.fetch_add(1, Ordering::Relaxed) + 1;
        Arc::new_cyclic(|me| WorkerLease {
            name: format!("{} lease {number}", self.name),
            pool: Arc::clone(self),
            owner: Mutex::new(None),
            me: me.clone(),
        })
    }

    pub fn max_leases(&self) -> u32 {
        self.max_leases
    }

    /// Number of leases currently held
    pub fn in_use(&self) -> u32 {
        *self.in_use.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn grant(&self) -> bool {
        let mut in_use = self.in_use.lock().unwrap_or_else(|e| e.into_inner());
        if *in_use < self.max_leases {
            *in_use += 1;
            true
        } else {
            false
        }
    }

    fn surrender(&self) {
        let mut in_use = self.in_use.lock().unwrap_or_else(|e| e.into_inner());
        *in_use = in_use.saturating_sub(1);
    }
}

/// One worker slot drawn from a [`LeasePool`]
pub struct WorkerLease {
    name: String,
    pool: Arc<LeasePool>,
    owner: Mutex<Option<ThreadId>>,
    me: Weak<WorkerLease>,
}

impl WorkerLease {
    fn owner(&self) -> Option<ThreadId> {
        *self.owner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handle(&self) -> Option<Arc<dyn ResourceLock>> {
        self.me.upgrade().map(|lease| lease as Arc<dyn ResourceLock>)
    }
}

impl ResourceLock for WorkerLease {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn try_lock(&self) -> Result<bool, CoordinationError> {
        let state = self.pool.coordinator.current_state()?;
        let mut owner = self.owner.lock().unwrap_or_else(|e| e.into_inner());
        match *owner {
            Some(id) if id == thread::current().id() => Ok(true),
            Some(_) => Ok(false),
            None => {
                if !self.pool.grant() {
                    return Ok(false);
                }
                *owner = Some(thread::current().id());
                drop(owner);
                debug!(lease = %self.name, in_use = self.pool.in_use(), "acquired worker lease");
                if let Some(handle) = self.handle() {
                    state.register_locked(handle);
                }
                Ok(true)
            }
        }
    }

    fn unlock(&self) -> Result<(), CoordinationError> {
        let state = self.pool.coordinator.current_state()?;
        let mut owner = self.owner.lock().unwrap_or_else(|e| e.into_inner());
        match *owner {
            None => Ok(()),
            Some(id) if id == thread::current().id() => {
                *owner = None;
                drop(owner);
                self.pool.surrender();
                debug!(lease = %self.name, in_use = self.pool.in_use(), "released worker lease");
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
#[path = "lease_tests.rs"]
mod tests;
