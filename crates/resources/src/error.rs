// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the coordination core

use thiserror::Error;

/// Violations of the coordination contract
///
/// These are programming errors, not contention: a resource that is simply
/// unavailable is reported through the `Failed`/`Retry` dispositions instead.
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// Lock state was touched outside a transform, or by a thread that is
    /// not the current state-lock holder.
    #[error("current thread does not hold the resource state lock")]
    StateLockNotHeld,
    /// A release was attempted by a thread that does not own the lock.
    #[error("resource lock {name} is held by another thread")]
    HeldByOtherThread { name: String },
}
