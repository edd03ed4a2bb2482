// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! FIFO-fair cancellable mutex, generic over its inner gate. See [`FifoMutex`],
//! [`SpinCasMutex`], [`MonitorMutex`].

use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{AsyncMutex, InnerGate, MonitorGate, MutexReleaseGuard, SpinGate, SyncError,
            WaiterCell, WaiterStatus};

/// The waiter FIFO protected by the inner gate. The mutex is *held* iff the queue is
/// non-empty; the holder is the head waiter, which is always `Activated`.
pub type WaiterQueue = VecDeque<Arc<WaiterCell>>;

/// FIFO mutex whose inner gate is the spinning-CAS [`SpinGate`].
pub type SpinCasMutex = FifoMutex<SpinGate<WaiterQueue>>;

/// FIFO mutex whose inner gate is the OS-monitor [`MonitorGate`].
pub type MonitorMutex = FifoMutex<MonitorGate<WaiterQueue>>;

/// A FIFO-fair, cancellable, parkable mutual-exclusion lock.
///
/// The waiter algorithm is written once against [`InnerGate`]; [`SpinCasMutex`] and
/// [`MonitorMutex`] are gate instantiations and behave identically. (The third
/// variant, [`SemaphoreMutex`], replaces the queue+gate pair with a one-permit
/// semaphore and lives in its own module.)
///
/// # State machine
///
/// - `lock`: append a waiter under the gate; a sole waiter is activated on the spot,
///   anyone else parks on their [`WaiterCell`].
/// - release: remove the head under the gate, then activate the next still-pending
///   waiter (skipping any that lost a cancellation race and are awaiting unlink).
/// - cancellation: the `Pending → Cancelled` CAS either wins (unlink the parked
///   waiter) or loses to activation, in which case the caller momentarily *is* the
///   holder and performs a full release so ownership reaches the next waiter. Exactly
///   one of {caller raises `Cancelled`, next waiter activated} is observable.
///
/// [`SemaphoreMutex`]: crate::SemaphoreMutex
#[derive(Debug)]
pub struct FifoMutex<G: InnerGate<WaiterQueue>> {
    inner: Arc<G>,
}

impl<G: InnerGate<WaiterQueue> + 'static> Default for FifoMutex<G> {
    fn default() -> Self { Self::new() }
}

impl<G: InnerGate<WaiterQueue> + 'static> FifoMutex<G> {
    /// Creates an unheld mutex.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(G::new(WaiterQueue::new())),
        }
    }

    /// Acquires the mutex; parks FIFO-fair behind existing waiters.
    ///
    /// # Errors
    ///
    /// [`SyncError::Cancelled`] if `cancel` was already triggered or fires while
    /// parked (queue state is restored either way).
    pub async fn lock(
        &self,
        cancel: &CancellationToken,
    ) -> Result<MutexReleaseGuard, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let waiter = Arc::new(WaiterCell::new());
        {
            let mut queue = self.inner.enter().await;
            queue.push_back(Arc::clone(&waiter));
            if queue.len() == 1 {
                // Sole element: this caller is the holder.
                let became_holder = waiter.try_complete(WaiterStatus::Activated);
                debug_assert!(became_holder);
            }
        }

        tokio::select! {
            status = waiter.wait() => match status {
                WaiterStatus::Activated => Ok(self.guard_for(waiter)),
                // Only the cancellation arm below completes a waiter as Cancelled,
                // and that arm does not get here. Defensive.
                WaiterStatus::Cancelled => Err(SyncError::Cancelled),
            },
            () = cancel.cancelled() => self.cancel_waiter(waiter).await,
        }
    }

    /// Acquires only when the queue is empty; never steals ahead of a parked waiter.
    pub fn try_lock(&self) -> Option<MutexReleaseGuard> {
        let mut queue = self.inner.enter_blocking();
        if queue.is_empty() {
            let holder = Arc::new(WaiterCell::completed(WaiterStatus::Activated));
            queue.push_back(Arc::clone(&holder));
            drop(queue);
            Some(self.guard_for(holder))
        } else {
            None
        }
    }

    fn guard_for(&self, holder: Arc<WaiterCell>) -> MutexReleaseGuard {
        let inner = Arc::clone(&self.inner);
        MutexReleaseGuard::new(move || release_holder(inner.as_ref(), &holder))
    }

    /// Resolves a fired cancellation token against the waiter's completion race.
    async fn cancel_waiter(
        &self,
        waiter: Arc<WaiterCell>,
    ) -> Result<MutexReleaseGuard, SyncError> {
        if waiter.try_complete(WaiterStatus::Cancelled) {
            // Still parked: unlink. A parked waiter is never the head (the head is
            // always Activated), so no hand-off is needed; a concurrent release that
            // reaches this cell first skips it in its activation walk.
            let mut queue = self.inner.enter().await;
            if let Some(index) = queue.iter().position(|w| Arc::ptr_eq(w, &waiter)) {
                debug_assert!(index > 0, "a parked waiter cannot be the queue head");
                queue.remove(index);
            }
            Err(SyncError::Cancelled)
        } else {
            // Activation won the race: the caller owns the mutex at this instant.
            // Hand ownership to the next waiter, then report the cancellation.
            tracing::trace!("mutex cancellation lost activation race; handing off");
            release_holder(self.inner.as_ref(), &waiter);
            Err(SyncError::Cancelled)
        }
    }
}

#[async_trait]
impl<G: InnerGate<WaiterQueue> + 'static> AsyncMutex for FifoMutex<G> {
    async fn lock(
        &self,
        cancel: &CancellationToken,
    ) -> Result<MutexReleaseGuard, SyncError> {
        FifoMutex::lock(self, cancel).await
    }

    fn try_lock(&self) -> Option<MutexReleaseGuard> { FifoMutex::try_lock(self) }
}

/// Removes `holder` from the queue and, if it was the head, activates the next
/// still-pending waiter. Runs on guard close/drop and on the cancellation hand-off
/// path, so it uses the gate's non-async entry.
fn release_holder<G: InnerGate<WaiterQueue>>(gate: &G, holder: &Arc<WaiterCell>) {
    let mut queue = gate.enter_blocking();
    if let Some(index) = queue.iter().position(|w| Arc::ptr_eq(w, holder)) {
        queue.remove(index);
        if index == 0 {
            activate_next(&mut queue);
        }
    }
}

/// Walks the head of the queue, discarding waiters that lost a cancellation race and
/// activating the first still-pending one.
fn activate_next(queue: &mut WaiterQueue) {
    while let Some(next) = queue.front() {
        if next.try_complete(WaiterStatus::Activated) {
            break;
        }
        // Cancelled before reaching the head; its owner will find it already
        // unlinked.
        queue.pop_front();
    }
}
