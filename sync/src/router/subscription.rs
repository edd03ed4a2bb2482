// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Registered subscriptions and their release handles. See [`SubscriptionGuard`].

use std::sync::{Arc,
                atomic::{AtomicU64, Ordering}};

use futures_util::future::BoxFuture;

use crate::{MessageHandler, ScopedAsyncRelease};

/// Monotonic id source for subscriptions, crate-wide. The value has no semantic
/// meaning; it only lets unregistration find its entry without comparing handler
/// pointers.
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_subscription_id() -> u64 {
    NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::SeqCst)
}

/// One `(binding key, handler)` registration inside a router's copy-on-write
/// snapshot.
pub(crate) struct Subscription<M: Send + 'static> {
    pub(crate) id: u64,
    pub(crate) key: String,
    pub(crate) handler: Arc<dyn MessageHandler<M>>,
}

// Manual: a derived Clone would demand `M: Clone`, which dispatch does not need
// here.
impl<M: Send + 'static> Clone for Subscription<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            key: self.key.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<M: Send + 'static> std::fmt::Debug for Subscription<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Release handle for a router subscription.
///
/// [`close`] unsubscribes: it acquires the router's internal registration mutex and
/// publishes a snapshot without this subscription. The guard holds only a *weak*
/// back-reference to the router, so a router reclaimed before its subscriptions are
/// released makes [`close`] a no-op instead of an error.
///
/// Dropping the guard without closing is best-effort ([`ScopedAsyncRelease`]
/// semantics): the release runs only if the registration mutex is immediately
/// available. Correct programs call [`close`].
///
/// [`close`]: Self::close
#[must_use = "call close().await to unsubscribe; dropping only attempts a \
              best-effort release"]
#[derive(Debug)]
pub struct SubscriptionGuard {
    release: ScopedAsyncRelease,
    key: String,
}

impl SubscriptionGuard {
    pub(crate) fn new(
        key: String,
        release_action: BoxFuture<'static, ()>,
        drop_fallback: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            release: ScopedAsyncRelease::with_fallback(release_action, drop_fallback),
            key,
        }
    }

    /// Unsubscribes now. Idempotent; a reclaimed router is a tolerated no-op.
    pub async fn close(&mut self) { self.release.close().await; }

    /// Whether the subscription has already been released.
    #[must_use]
    pub fn is_released(&self) -> bool { self.release.is_released() }

    /// The (normalized) binding key this subscription was registered under. Empty for
    /// broadcast subscriptions.
    #[must_use]
    pub fn key(&self) -> &str { &self.key }
}
