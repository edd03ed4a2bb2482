// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Mutex variant built on a one-permit counting semaphore. See [`SemaphoreMutex`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::{AsyncMutex, MutexReleaseGuard, SyncError};

/// A mutex that replaces the waiter FIFO + inner gate with a counting semaphore of
/// capacity 1. Waiter discipline (parking, fairness, wakeup) is delegated entirely to
/// [`tokio::sync::Semaphore`], which queues acquirers fairly.
///
/// Exposes the same contract as the FIFO variants; see [`AsyncMutex`].
#[derive(Debug)]
pub struct SemaphoreMutex {
    permits: Arc<Semaphore>,
}

impl SemaphoreMutex {
    /// Creates an unheld mutex.
    #[must_use]
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    /// Acquires the mutex by awaiting the semaphore's single permit.
    ///
    /// # Errors
    ///
    /// [`SyncError::Cancelled`] if `cancel` was already triggered or fires first.
    /// Dropping the in-flight acquire removes this caller from the semaphore's
    /// internal queue, so no state restoration is needed here.
    pub async fn lock(
        &self,
        cancel: &CancellationToken,
    ) -> Result<MutexReleaseGuard, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        tokio::select! {
            acquired = Arc::clone(&self.permits).acquire_owned() => {
                match acquired {
                    Ok(permit) => Ok(MutexReleaseGuard::new(move || drop(permit))),
                    // The semaphore is owned by this mutex and never closed.
                    Err(_closed) => unreachable!("SemaphoreMutex semaphore closed"),
                }
            }
            () = cancel.cancelled() => Err(SyncError::Cancelled),
        }
    }

    /// Zero-timeout acquire attempt.
    pub fn try_lock(&self) -> Option<MutexReleaseGuard> {
        Arc::clone(&self.permits)
            .try_acquire_owned()
            .ok()
            .map(|permit| MutexReleaseGuard::new(move || drop(permit)))
    }
}

impl Default for SemaphoreMutex {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl AsyncMutex for SemaphoreMutex {
    async fn lock(
        &self,
        cancel: &CancellationToken,
    ) -> Result<MutexReleaseGuard, SyncError> {
        SemaphoreMutex::lock(self, cancel).await
    }

    fn try_lock(&self) -> Option<MutexReleaseGuard> { SemaphoreMutex::try_lock(self) }
}
