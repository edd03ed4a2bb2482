// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The public contract shared by every mutex variant. See [`AsyncMutex`],
//! [`MutexReleaseGuard`].

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{ScopedRelease, SyncError};

/// The one contract exposed by all three mutex variants ([`SpinCasMutex`],
/// [`MonitorMutex`], [`SemaphoreMutex`]). The variants differ only in how they protect
/// their internal waiter queue; callers that just need *a* mutex (like the routers'
/// registration path) take `dyn AsyncMutex` and stay variant-agnostic.
///
/// Locking is not reentrant: a holder that calls [`lock`] again parks behind itself
/// and deadlocks (released only by its own cancellation token).
///
/// [`MonitorMutex`]: crate::MonitorMutex
/// [`SemaphoreMutex`]: crate::SemaphoreMutex
/// [`SpinCasMutex`]: crate::SpinCasMutex
/// [`lock`]: Self::lock
#[async_trait]
pub trait AsyncMutex: Send + Sync {
    /// Acquires the mutex, parking the caller FIFO-fair behind existing waiters.
    ///
    /// # Errors
    ///
    /// [`SyncError::Cancelled`] if `cancel` was already triggered, or fires while the
    /// caller is parked. Cancellation restores the queue: the caller's waiter is
    /// removed, and if activation raced the cancellation, ownership is handed to the
    /// next waiter.
    async fn lock(&self, cancel: &CancellationToken)
    -> Result<MutexReleaseGuard, SyncError>;

    /// Acquires the mutex only if it is free *and* no waiter is queued; never steals
    /// ahead of a parked `lock` call.
    fn try_lock(&self) -> Option<MutexReleaseGuard>;
}

/// Release handle for an acquired mutex. Releasing is idempotent ([`ScopedRelease`]
/// underneath): dropping the guard, calling [`close`] once, or calling it ten times
/// all produce exactly one release.
///
/// [`close`]: Self::close
#[must_use = "dropping the guard releases the mutex immediately"]
#[derive(Debug)]
pub struct MutexReleaseGuard {
    release: ScopedRelease,
}

impl MutexReleaseGuard {
    pub(crate) fn new(release_action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: ScopedRelease::new(release_action),
        }
    }

    /// Releases the mutex now instead of at end of scope. Idempotent.
    pub fn close(&mut self) { self.release.close(); }

    /// Whether this handle has already released.
    #[must_use]
    pub fn is_released(&self) -> bool { self.release.is_released() }
}
