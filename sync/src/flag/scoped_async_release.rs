// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Async-close variant of [`ScopedRelease`]. See [`ScopedAsyncRelease`].
//!
//! [`ScopedRelease`]: crate::ScopedRelease

use futures_util::future::BoxFuture;

use crate::OnceFlag;

/// An idempotent release guard whose release action is asynchronous.
///
/// [`close`] awaits the action at most once. Because Rust destructors cannot await,
/// dropping the guard without calling [`close`] is *best-effort*: the optional
/// synchronous fallback runs instead, and if none was supplied the release is skipped
/// with a [`tracing::warn!`]. Correct programs release explicitly; the drop path
/// exists so a forgotten guard degrades gracefully rather than deadlocking.
///
/// Used by the router subscription guards, whose release must acquire the router's
/// internal async mutex (see [`SubscriptionGuard`]).
///
/// [`SubscriptionGuard`]: crate::SubscriptionGuard
/// [`close`]: Self::close
#[must_use = "call close().await to run the async release action; dropping only runs \
              the best-effort fallback"]
pub struct ScopedAsyncRelease {
    released: OnceFlag,
    action: Option<BoxFuture<'static, ()>>,
    fallback: Option<Box<dyn FnOnce() + Send>>,
}

impl ScopedAsyncRelease {
    /// Wraps an async release action with no drop-path fallback.
    pub fn new(action: BoxFuture<'static, ()>) -> Self {
        Self {
            released: OnceFlag::new(),
            action: Some(action),
            fallback: None,
        }
    }

    /// Wraps an async release action plus a synchronous best-effort fallback that runs
    /// if the guard is dropped without [`close`] having been awaited.
    ///
    /// [`close`]: Self::close
    pub fn with_fallback(
        action: BoxFuture<'static, ()>,
        fallback: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            released: OnceFlag::new(),
            action: Some(action),
            fallback: Some(Box::new(fallback)),
        }
    }

    /// Awaits the release action if it has not run yet. Idempotent.
    pub async fn close(&mut self) {
        if self.released.try_set() {
            self.fallback = None;
            if let Some(action) = self.action.take() {
                action.await;
            }
        }
    }

    /// Whether the release (or its fallback) has already run.
    #[must_use]
    pub fn is_released(&self) -> bool { self.released.is_set() }
}

impl Drop for ScopedAsyncRelease {
    fn drop(&mut self) {
        if self.released.try_set() {
            match self.fallback.take() {
                Some(fallback) => fallback(),
                None => tracing::warn!(
                    "ScopedAsyncRelease dropped without close(); async release skipped"
                ),
            }
        }
    }
}

impl std::fmt::Debug for ScopedAsyncRelease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedAsyncRelease")
            .field("released", &self.released.is_set())
            .field("has_fallback", &self.fallback.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc,
                    atomic::{AtomicUsize, Ordering}};

    fn counting_action(counter: &Arc<AtomicUsize>) -> BoxFuture<'static, ()> {
        let counter = Arc::clone(counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn close_awaits_the_action_once() {
        let run_count = Arc::new(AtomicUsize::new(0));
        let mut guard = ScopedAsyncRelease::new(counting_action(&run_count));

        guard.close().await;
        guard.close().await;
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
        assert!(guard.is_released());
    }

    #[tokio::test]
    async fn drop_runs_the_fallback_when_not_closed() {
        let async_runs = Arc::new(AtomicUsize::new(0));
        let fallback_runs = Arc::new(AtomicUsize::new(0));

        {
            let fallback_counter = Arc::clone(&fallback_runs);
            let _guard = ScopedAsyncRelease::with_fallback(
                counting_action(&async_runs),
                move || {
                    fallback_counter.fetch_add(1, Ordering::SeqCst);
                },
            );
        }

        assert_eq!(async_runs.load(Ordering::SeqCst), 0);
        assert_eq!(fallback_runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fallback_does_not_run_after_close() {
        let async_runs = Arc::new(AtomicUsize::new(0));
        let fallback_runs = Arc::new(AtomicUsize::new(0));

        {
            let fallback_counter = Arc::clone(&fallback_runs);
            let mut guard = ScopedAsyncRelease::with_fallback(
                counting_action(&async_runs),
                move || {
                    fallback_counter.fetch_add(1, Ordering::SeqCst);
                },
            );
            guard.close().await;
        }

        assert_eq!(async_runs.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_runs.load(Ordering::SeqCst), 0);
    }
}
