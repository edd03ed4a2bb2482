// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Writer-preferring reader/writer lock. See [`ReaderWriterLock`].

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::{RwPhase, RwState, ScopedRelease, SyncError, WaiterCell, WaiterStatus};

/// A FIFO, writer-preferring reader/writer lock for cooperative tasks.
///
/// Any number of readers share the lock; one writer excludes everyone. Once a writer
/// queues, later readers park behind it ([`RwPhase::PendingWrite`]); the writer runs
/// as soon as the active readers drain. When every queued writer disappears through
/// cancellation, the parked readers are batch-activated instead - a reader that
/// arrived after a doomed writer is never stranded.
///
/// All transitions execute under a single internal critical section and live in
/// [`RwState`]. No operation here fails except via cancellation; a violated phase
/// invariant is a fatal bug and panics.
///
/// Reentrancy and read-to-write upgrades are not supported: a reader that requests a
/// write (or vice versa) parks like any other caller and deadlocks against itself.
#[derive(Debug, Default)]
pub struct ReaderWriterLock {
    state: Arc<StdMutex<RwState>>,
}

impl ReaderWriterLock {
    /// Creates an idle lock.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Acquires shared (read) access; parks while a writer holds or is queued.
    ///
    /// # Errors
    ///
    /// [`SyncError::Cancelled`] if `cancel` was already triggered or fires while
    /// parked. State is restored either way; if activation raced the cancellation,
    /// the read access is handed back (releasing it for any queued writer).
    pub async fn wait_for_read(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ReadReleaseGuard, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let waiter = Arc::new(WaiterCell::new());
        lock_state(&self.state).admit_reader(Arc::clone(&waiter));

        tokio::select! {
            status = waiter.wait() => match status {
                WaiterStatus::Activated => Ok(self.read_guard(waiter)),
                WaiterStatus::Cancelled => Err(SyncError::Cancelled),
            },
            () = cancel.cancelled() => {
                if waiter.try_complete(WaiterStatus::Cancelled) {
                    lock_state(&self.state).unlink_cancelled_reader(&waiter);
                } else {
                    // Activated concurrently: this caller is an active reader right
                    // now; hand the access back before reporting the cancellation.
                    lock_state(&self.state).release_reader(&waiter);
                }
                Err(SyncError::Cancelled)
            }
        }
    }

    /// Acquires exclusive (write) access; parks behind active readers and earlier
    /// writers.
    ///
    /// # Errors
    ///
    /// [`SyncError::Cancelled`] as for [`wait_for_read`]; a cancelled head writer
    /// hands off exactly like a released one (next writer, else the parked reader
    /// batch).
    ///
    /// [`wait_for_read`]: Self::wait_for_read
    pub async fn wait_for_write(
        &self,
        cancel: &CancellationToken,
    ) -> Result<WriteReleaseGuard, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let waiter = Arc::new(WaiterCell::new());
        lock_state(&self.state).admit_writer(Arc::clone(&waiter));

        tokio::select! {
            status = waiter.wait() => match status {
                WaiterStatus::Activated => Ok(self.write_guard(waiter)),
                WaiterStatus::Cancelled => Err(SyncError::Cancelled),
            },
            () = cancel.cancelled() => {
                if waiter.try_complete(WaiterStatus::Cancelled) {
                    lock_state(&self.state).unlink_cancelled_writer(&waiter);
                } else {
                    lock_state(&self.state).release_writer(&waiter);
                }
                Err(SyncError::Cancelled)
            }
        }
    }

    /// Non-suspending read attempt; succeeds only in `Idle` or `Reading` phase
    /// (writer preference: a queued writer makes this fail).
    pub fn try_enter_read(&self) -> Option<ReadReleaseGuard> {
        let mut state = lock_state(&self.state);
        match state.phase {
            RwPhase::Idle | RwPhase::Reading => {
                let waiter = Arc::new(WaiterCell::completed(WaiterStatus::Activated));
                state.reading.push(Arc::clone(&waiter));
                state.phase = RwPhase::Reading;
                state.assert_phase_invariants();
                drop(state);
                Some(self.read_guard(waiter))
            }
            RwPhase::PendingWrite | RwPhase::Writing => None,
        }
    }

    /// Non-suspending write attempt; succeeds only in `Idle` phase.
    pub fn try_enter_write(&self) -> Option<WriteReleaseGuard> {
        let mut state = lock_state(&self.state);
        match state.phase {
            RwPhase::Idle => {
                let waiter = Arc::new(WaiterCell::completed(WaiterStatus::Activated));
                state.pending_writers.push_back(Arc::clone(&waiter));
                state.phase = RwPhase::Writing;
                state.assert_phase_invariants();
                drop(state);
                Some(self.write_guard(waiter))
            }
            RwPhase::Reading | RwPhase::PendingWrite | RwPhase::Writing => None,
        }
    }

    fn read_guard(&self, waiter: Arc<WaiterCell>) -> ReadReleaseGuard {
        let state = Arc::clone(&self.state);
        ReadReleaseGuard {
            release: ScopedRelease::new(move || {
                lock_state(&state).release_reader(&waiter);
            }),
        }
    }

    fn write_guard(&self, waiter: Arc<WaiterCell>) -> WriteReleaseGuard {
        let state = Arc::clone(&self.state);
        WriteReleaseGuard {
            release: ScopedRelease::new(move || {
                lock_state(&state).release_writer(&waiter);
            }),
        }
    }
}

fn lock_state(state: &StdMutex<RwState>) -> std::sync::MutexGuard<'_, RwState> {
    // A poisoning panic can only originate from a failed phase assertion, which is
    // fatal on its own; transitions never leave the lists half-updated.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Release handle for shared (read) access. Idempotent; dropping releases.
#[must_use = "dropping the guard releases the read access immediately"]
#[derive(Debug)]
pub struct ReadReleaseGuard {
    release: ScopedRelease,
}

impl ReadReleaseGuard {
    /// Releases the read access now. Idempotent.
    pub fn close(&mut self) { self.release.close(); }

    /// Whether this handle has already released.
    #[must_use]
    pub fn is_released(&self) -> bool { self.release.is_released() }
}

/// Release handle for exclusive (write) access. Idempotent; dropping releases.
#[must_use = "dropping the guard releases the write access immediately"]
#[derive(Debug)]
pub struct WriteReleaseGuard {
    release: ScopedRelease,
}

impl WriteReleaseGuard {
    /// Releases the write access now. Idempotent.
    pub fn close(&mut self) { self.release.close(); }

    /// Whether this handle has already released.
    #[must_use]
    pub fn is_released(&self) -> bool { self.release.is_released() }
}
