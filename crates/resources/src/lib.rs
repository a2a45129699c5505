// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kiln-resources: resource-lock coordination core for the kiln build engine
//!
//! This crate provides:
//! - The `ResourceLock` contract plus exclusive-lock and worker-lease
//!   implementations
//! - Per-attempt rollback bookkeeping (`ResourceLockState`)
//! - The `LockCoordinator`: serialized lock-state transforms with
//!   all-or-nothing acquisition, retry-on-change blocking, and release
//!   listeners

pub mod coordinator;
pub mod error;
pub mod lease;
pub mod lock;
pub mod state;

// Re-exports
pub use coordinator::{Disposition, LockCoordinator, LockReleaseListener, OperationResult};
pub use error::CoordinationError;
pub use lease::{LeasePool, WorkerLease};
pub use lock::{ExclusiveLock, ResourceLock};
pub use state::ResourceLockState;
