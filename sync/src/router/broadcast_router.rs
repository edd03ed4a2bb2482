// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Key-less pub/sub dispatcher with copy-on-write subscriber snapshots. See
//! [`BroadcastRouter`].

use std::sync::{Arc, PoisonError, RwLock as StdRwLock};

use tokio_util::sync::CancellationToken;

use crate::{AsyncMutex, MessageHandler, PublishResult, SpinCasMutex, Subscription,
            SubscriptionGuard, SyncError, next_subscription_id,
            router::dispatch::dispatch_to_snapshot};

/// A broadcast message router: every registered handler receives every published
/// message.
///
/// # Concurrency shape
///
/// Registration and unregistration serialize on an internal [`AsyncMutex`] (any
/// mutex variant; [`SpinCasMutex`] by default) and publish a *new* immutable
/// subscriber array each time. Publication never takes that mutex: it clones one
/// atomic snapshot pointer and dispatches from it. A publish that races a
/// registration therefore sees either the pre- or post-registration array, never a
/// torn state.
///
/// Subscriptions hold only a weak back-reference to the router, so the router can be
/// reclaimed before its subscriptions are released; releasing afterwards is a no-op.
pub struct BroadcastRouter<M: Send + 'static> {
    core: Arc<BroadcastCore<M>>,
}

impl<M: Send + 'static> BroadcastRouter<M> {
    /// Creates a router whose registration mutex is a [`SpinCasMutex`].
    #[must_use]
    pub fn new() -> Self { Self::with_registry_mutex(Box::new(SpinCasMutex::new())) }

    /// Creates a router serializing registrations on the supplied mutex variant.
    #[must_use]
    pub fn with_registry_mutex(registry_gate: Box<dyn AsyncMutex>) -> Self {
        Self {
            core: Arc::new(BroadcastCore {
                registry_gate,
                snapshot: StdRwLock::new(Vec::new().into()),
            }),
        }
    }

    /// Registers `handler` for every future publish, until the returned guard is
    /// closed (or dropped).
    ///
    /// # Errors
    ///
    /// [`SyncError::Cancelled`] if `cancel` fires while waiting for the registration
    /// mutex; [`SyncError::DuplicateSubscription`] if this exact `Arc` is already
    /// registered.
    pub async fn register_callback(
        &self,
        handler: Arc<dyn MessageHandler<M>>,
        cancel: &CancellationToken,
    ) -> Result<SubscriptionGuard, SyncError> {
        let _registry = self.core.registry_gate.lock(cancel).await?;

        let current = self.core.snapshot();
        if current
            .iter()
            .any(|subscription| Arc::ptr_eq(&subscription.handler, &handler))
        {
            return Err(SyncError::DuplicateSubscription { key: String::new() });
        }

        let id = next_subscription_id();
        let mut next = current.to_vec();
        next.push(Subscription {
            id,
            key: String::new(),
            handler,
        });
        self.core.store(next);
        tracing::debug!(id, "broadcast subscription registered");

        Ok(guard_for(&self.core, id))
    }

    /// Dispatches `message` to every distinct registered handler, awaiting them all.
    /// Handler failures are aggregated in the result, never raised.
    pub async fn publish_message(&self, key: &str, message: M) -> PublishResult
    where
        M: Clone,
    {
        let snapshot = self.core.snapshot();
        dispatch_to_snapshot(&snapshot, key, message).await
    }

    /// Number of live subscriptions (snapshot length).
    #[must_use]
    pub fn subscription_count(&self) -> usize { self.core.snapshot().len() }
}

impl<M: Send + 'static> Default for BroadcastRouter<M> {
    fn default() -> Self { Self::new() }
}

impl<M: Send + 'static> std::fmt::Debug for BroadcastRouter<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastRouter")
            .field("subscription_count", &self.subscription_count())
            .finish_non_exhaustive()
    }
}

pub(crate) struct BroadcastCore<M: Send + 'static> {
    registry_gate: Box<dyn AsyncMutex>,
    snapshot: StdRwLock<Arc<[Subscription<M>]>>,
}

impl<M: Send + 'static> BroadcastCore<M> {
    /// One atomic snapshot read; the publish path never holds a lock across
    /// dispatch.
    fn snapshot(&self) -> Arc<[Subscription<M>]> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn store(&self, next: Vec<Subscription<M>>) {
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = next.into();
    }

    async fn unregister(&self, id: u64) {
        let Ok(_registry) = self
            .registry_gate
            .lock(&CancellationToken::new())
            .await
        else {
            return;
        };
        self.remove_subscription(id);
    }

    fn unregister_best_effort(&self, id: u64) {
        match self.registry_gate.try_lock() {
            Some(_registry) => self.remove_subscription(id),
            None => tracing::warn!(
                id,
                "subscription guard dropped while the registry was busy; release \
                 skipped"
            ),
        }
    }

    fn remove_subscription(&self, id: u64) {
        let next: Vec<Subscription<M>> = self
            .snapshot()
            .iter()
            .filter(|subscription| subscription.id != id)
            .cloned()
            .collect();
        self.store(next);
        tracing::debug!(id, "broadcast subscription released");
    }
}

fn guard_for<M: Send + 'static>(
    core: &Arc<BroadcastCore<M>>,
    id: u64,
) -> SubscriptionGuard {
    let async_target = Arc::downgrade(core);
    let fallback_target = Arc::downgrade(core);
    SubscriptionGuard::new(
        String::new(),
        Box::pin(async move {
            if let Some(core) = async_target.upgrade() {
                core.unregister(id).await;
            }
        }),
        move || {
            if let Some(core) = fallback_target.upgrade() {
                core.unregister_best_effort(id);
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler_fn;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(
        counter: &Arc<AtomicUsize>,
    ) -> Arc<dyn MessageHandler<u64>> {
        let counter = Arc::clone(counter);
        handler_fn(move |_key: String, _message: u64| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    /// Delivery with aggregation: first handler fails, second succeeds; the publish
    /// reports both receivers, carries the aggregate, and the second handler ran
    /// exactly once.
    #[tokio::test]
    async fn failing_handler_does_not_stop_the_rest() {
        let router = BroadcastRouter::new();
        let cancel = CancellationToken::new();
        let second_runs = Arc::new(AtomicUsize::new(0));

        let failing = handler_fn(|_key: String, _message: u64| async move {
            Err(miette::miette!("handler rejected the message"))
        });

        let _first = router.register_callback(failing, &cancel).await.unwrap();
        let _second = router
            .register_callback(counting_handler(&second_runs), &cancel)
            .await
            .unwrap();

        let result = router.publish_message("", 15).await;

        assert_eq!(result.receiver_count, 2);
        let aggregate = result.error.expect("one handler failed");
        assert_eq!(aggregate.failure_count(), 1);
        assert_eq!(second_runs.load(Ordering::SeqCst), 1);
    }

    /// Unregister: delivery happens while the subscription is live and stops after
    /// its guard is closed.
    #[tokio::test]
    async fn closed_subscription_stops_receiving() {
        let router = BroadcastRouter::new();
        let cancel = CancellationToken::new();
        let deliveries = Arc::new(AtomicUsize::new(0));

        let mut guard = router
            .register_callback(counting_handler(&deliveries), &cancel)
            .await
            .unwrap();

        let live = router.publish_message("", 1).await;
        assert_eq!(live.receiver_count, 1);
        assert_eq!(deliveries.load(Ordering::SeqCst), 1);

        guard.close().await;
        assert!(guard.is_released());

        let after = router.publish_message("", 2).await;
        assert_eq!(after.receiver_count, 0);
        assert_eq!(deliveries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_identity_registration_is_rejected() {
        let router = BroadcastRouter::new();
        let cancel = CancellationToken::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(&counter);

        let _first = router
            .register_callback(Arc::clone(&handler), &cancel)
            .await
            .unwrap();
        let second = router.register_callback(handler, &cancel).await;
        assert!(matches!(
            second,
            Err(SyncError::DuplicateSubscription { .. })
        ));
    }

    #[tokio::test]
    async fn panicking_handler_is_isolated_and_aggregated() {
        let router = BroadcastRouter::new();
        let cancel = CancellationToken::new();
        let survivor_runs = Arc::new(AtomicUsize::new(0));

        let panicking = handler_fn(|_key: String, _message: u64| async move {
            panic!("handler blew up");
            #[allow(unreachable_code)]
            Ok(())
        });

        let _first = router.register_callback(panicking, &cancel).await.unwrap();
        let _second = router
            .register_callback(counting_handler(&survivor_runs), &cancel)
            .await
            .unwrap();

        let result = router.publish_message("", 7).await;

        assert_eq!(result.receiver_count, 2);
        let aggregate = result.error.expect("the panic must be aggregated");
        assert_eq!(aggregate.failure_count(), 1);
        assert!(matches!(
            aggregate.failures()[0],
            crate::HandlerFailure::Panicked(_)
        ));
        assert_eq!(survivor_runs.load(Ordering::SeqCst), 1);
    }

    /// Weak back-reference: releasing a subscription after the router was reclaimed
    /// is a tolerated no-op.
    #[tokio::test]
    async fn closing_after_the_router_is_gone_is_a_no_op() {
        let counter = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let mut guard = {
            let router = BroadcastRouter::new();
            router
                .register_callback(counting_handler(&counter), &cancel)
                .await
                .unwrap()
            // `router` (the only strong reference to the core) drops here.
        };

        guard.close().await;
        assert!(guard.is_released());
    }

    /// Publish-during-registration determinism: a racing publish sees either the
    /// pre- or post-registration snapshot, never a torn one, and nothing deadlocks.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_publish_and_registration_never_tear() {
        const ROUNDS: usize = 50;

        let router = Arc::new(BroadcastRouter::new());
        let cancel = CancellationToken::new();
        let deliveries = Arc::new(AtomicUsize::new(0));

        let _stable = router
            .register_callback(counting_handler(&deliveries), &cancel)
            .await
            .unwrap();

        for _ in 0..ROUNDS {
            let publisher = {
                let router = Arc::clone(&router);
                tokio::spawn(async move { router.publish_message("", 3).await })
            };

            let mut transient = router
                .register_callback(counting_handler(&deliveries), &cancel)
                .await
                .unwrap();

            let result = publisher.await.unwrap();
            // Either the pre-registration (1) or post-registration (2) snapshot.
            assert!((1..=2).contains(&result.receiver_count));
            assert!(result.is_ok());

            transient.close().await;
        }

        let final_result = router.publish_message("", 4).await;
        assert_eq!(final_result.receiver_count, 1);
    }
}
