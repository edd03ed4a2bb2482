// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Completion cell that parks one suspended caller. See [`WaiterCell`],
//! [`WaiterStatus`].

use std::{pin::Pin,
          sync::{Mutex, PoisonError,
                 atomic::{AtomicU8, Ordering}},
          task::{Context, Poll, Waker}};

/// Terminal status of a [`WaiterCell`].
///
/// A waiter is created `Pending` (no status yet) and transitions exactly once to one
/// of these two values. The transition drives the parked caller's resumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum WaiterStatus {
    /// The primitive handed ownership to this waiter (lock acquired, read/write
    /// entered).
    Activated,
    /// The waiter's cancellation token fired before activation.
    Cancelled,
}

const STATE_PENDING: u8 = 0;
const STATE_ACTIVATED: u8 = 1;
const STATE_CANCELLED: u8 = 2;

/// A future-like completion cell carrying a terminal [`WaiterStatus`].
///
/// Each cell is linked into exactly one queue belonging to exactly one primitive at a
/// time: created when a caller suspends, completed exactly once, unlinked on
/// completion. The single-transition discipline is what makes cancellation hand-off
/// race-free: when a release path and a cancellation path race, exactly one
/// [`try_complete`] wins, and the loser re-enters the primitive's critical section to
/// propagate ownership (see the mutex and reader/writer state machines).
///
/// # Why [`AtomicU8`] + a waker slot instead of a oneshot channel?
///
/// The loser of a completion race must *observe that it lost* and react; a oneshot
/// sender is consumed by the first send and cannot express "try to complete, tell me
/// if someone beat me". One CAS on an atomic word gives exactly that, with no
/// allocation per completion.
///
/// The waker slot uses a [`std::sync::Mutex`]; it is held for a clone or a take, never
/// across a wake. Lost-wakeup freedom: [`try_complete`] stores the terminal state
/// *before* taking the waker, and [`WaiterFuture::poll`] re-checks the state *after*
/// storing its waker, so every interleaving either wakes the stored waker or lets the
/// poller see the terminal state directly.
///
/// [`AtomicU8`]: std::sync::atomic::AtomicU8
/// [`try_complete`]: Self::try_complete
#[derive(Debug, Default)]
pub struct WaiterCell {
    state: AtomicU8,
    waker: Mutex<Option<Waker>>,
}

impl WaiterCell {
    /// Creates a pending waiter.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Creates a waiter already completed with `status`. Used by the non-suspending
    /// `try_*` acquisition paths, which insert an already-activated holder.
    #[must_use]
    pub fn completed(status: WaiterStatus) -> Self {
        let cell = Self::new();
        let did_complete = cell.try_complete(status);
        debug_assert!(did_complete);
        cell
    }

    /// Attempts the unique `Pending → status` transition. Returns `true` to the single
    /// winner; `false` if the cell already carries a terminal status. Wakes the parked
    /// caller on success.
    pub fn try_complete(&self, status: WaiterStatus) -> bool {
        let terminal = match status {
            WaiterStatus::Activated => STATE_ACTIVATED,
            WaiterStatus::Cancelled => STATE_CANCELLED,
        };
        let won = self
            .state
            .compare_exchange(STATE_PENDING, terminal, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if won {
            let maybe_waker = self
                .waker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(waker) = maybe_waker {
                waker.wake();
            }
        }
        won
    }

    /// The terminal status, or [`None`] while still pending.
    #[must_use]
    pub fn status(&self) -> Option<WaiterStatus> {
        match self.state.load(Ordering::SeqCst) {
            STATE_ACTIVATED => Some(WaiterStatus::Activated),
            STATE_CANCELLED => Some(WaiterStatus::Cancelled),
            _ => None,
        }
    }

    /// Suspends until the cell is completed, resolving to the terminal status.
    #[must_use]
    pub fn wait(&self) -> WaiterFuture<'_> { WaiterFuture { cell: self } }
}

/// Future adapter for [`WaiterCell::wait`].
#[derive(Debug)]
pub struct WaiterFuture<'a> {
    cell: &'a WaiterCell,
}

impl Future for WaiterFuture<'_> {
    type Output = WaiterStatus;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(status) = self.cell.status() {
            return Poll::Ready(status);
        }

        // Store the waker, then re-check: a completion that landed between the first
        // check and the store has already taken (and missed) the slot.
        *self
            .cell
            .waker
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(cx.waker().clone());

        match self.cell.status() {
            Some(status) => Poll::Ready(status),
            None => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};

    #[test]
    fn new_cell_is_pending() {
        let cell = WaiterCell::new();
        assert_eq!(cell.status(), None);
    }

    #[test]
    fn first_completion_wins_second_loses() {
        let cell = WaiterCell::new();
        assert!(cell.try_complete(WaiterStatus::Activated));
        assert!(!cell.try_complete(WaiterStatus::Cancelled));
        assert_eq!(cell.status(), Some(WaiterStatus::Activated));
    }

    #[test]
    fn completed_constructor_is_terminal() {
        let cell = WaiterCell::completed(WaiterStatus::Activated);
        assert_eq!(cell.status(), Some(WaiterStatus::Activated));
        assert!(!cell.try_complete(WaiterStatus::Cancelled));
    }

    #[tokio::test]
    async fn wait_resolves_immediately_when_already_completed() {
        let cell = WaiterCell::completed(WaiterStatus::Cancelled);
        assert_eq!(cell.wait().await, WaiterStatus::Cancelled);
    }

    #[tokio::test]
    async fn wait_resumes_when_completed_from_another_task() {
        let cell = Arc::new(WaiterCell::new());

        let completer = {
            let cell = Arc::clone(&cell);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                assert!(cell.try_complete(WaiterStatus::Activated));
            })
        };

        assert_eq!(cell.wait().await, WaiterStatus::Activated);
        completer.await.unwrap();
    }

    /// Exercises the completion race: many completers, one cell, exactly one winner,
    /// and the parked waiter observes the winner's status.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_completers_produce_one_winner() {
        let cell = Arc::new(WaiterCell::new());

        let completers: Vec<_> = [WaiterStatus::Activated, WaiterStatus::Cancelled]
            .into_iter()
            .cycle()
            .take(8)
            .map(|status| {
                let cell = Arc::clone(&cell);
                tokio::spawn(async move { cell.try_complete(status) })
            })
            .collect();

        let observed = cell.wait().await;

        let mut winner_count = 0;
        for completer in completers {
            if completer.await.unwrap() {
                winner_count += 1;
            }
        }
        assert_eq!(winner_count, 1);
        assert_eq!(cell.status(), Some(observed));
    }
}
