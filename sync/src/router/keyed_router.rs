// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Keyed (unicast) pub/sub dispatcher. See [`KeyedRouter`].

use std::{collections::HashMap,
          sync::{Arc, PoisonError, RwLock as StdRwLock}};

use tokio_util::sync::CancellationToken;

use crate::{AsyncMutex, MessageHandler, PublishResult, SpinCasMutex, Subscription,
            SubscriptionGuard, SyncError, next_subscription_id,
            router::dispatch::dispatch_to_snapshot};

/// A keyed message router: a publish under key `k` invokes only the handlers
/// registered under `k`. Key comparison is case-insensitive (keys are normalized to
/// lowercase at the registration and publish boundaries).
///
/// Same concurrency shape as [`BroadcastRouter`]: registrations serialize on an
/// internal [`AsyncMutex`] and swap a new immutable `key → subscriptions` map;
/// publication clones one atomic snapshot pointer and never locks.
///
/// [`BroadcastRouter`]: crate::BroadcastRouter
pub struct KeyedRouter<M: Send + 'static> {
    core: Arc<KeyedCore<M>>,
}

type KeyedSnapshot<M> = HashMap<String, Arc<[Subscription<M>]>>;

impl<M: Send + 'static> KeyedRouter<M> {
    /// Creates a router whose registration mutex is a [`SpinCasMutex`].
    #[must_use]
    pub fn new() -> Self { Self::with_registry_mutex(Box::new(SpinCasMutex::new())) }

    /// Creates a router serializing registrations on the supplied mutex variant.
    #[must_use]
    pub fn with_registry_mutex(registry_gate: Box<dyn AsyncMutex>) -> Self {
        Self {
            core: Arc::new(KeyedCore {
                registry_gate,
                snapshot: StdRwLock::new(Arc::new(HashMap::new())),
            }),
        }
    }

    /// Registers `handler` under `key` (case-insensitive), until the returned guard
    /// is closed (or dropped).
    ///
    /// # Errors
    ///
    /// [`SyncError::EmptyBindingKey`] for an empty key; [`SyncError::Cancelled`] if
    /// `cancel` fires while waiting for the registration mutex;
    /// [`SyncError::DuplicateSubscription`] if this exact `Arc` is already registered
    /// under the same key.
    pub async fn register_callback(
        &self,
        key: &str,
        handler: Arc<dyn MessageHandler<M>>,
        cancel: &CancellationToken,
    ) -> Result<SubscriptionGuard, SyncError> {
        if key.is_empty() {
            return Err(SyncError::EmptyBindingKey);
        }
        let normalized = key.to_lowercase();

        let _registry = self.core.registry_gate.lock(cancel).await?;

        let current = self.core.snapshot();
        if current
            .get(&normalized)
            .is_some_and(|subscriptions| {
                subscriptions
                    .iter()
                    .any(|subscription| Arc::ptr_eq(&subscription.handler, &handler))
            })
        {
            return Err(SyncError::DuplicateSubscription { key: normalized });
        }

        let id = next_subscription_id();
        let mut next: KeyedSnapshot<M> = (*current).clone();
        let mut bucket: Vec<Subscription<M>> = next
            .get(&normalized)
            .map(|subscriptions| subscriptions.to_vec())
            .unwrap_or_default();
        bucket.push(Subscription {
            id,
            key: normalized.clone(),
            handler,
        });
        next.insert(normalized.clone(), bucket.into());
        self.core.store(next);
        tracing::debug!(id, key = %normalized, "keyed subscription registered");

        Ok(guard_for(&self.core, id, normalized))
    }

    /// Dispatches `message` to the handlers registered under `key`
    /// (case-insensitive). An unknown key is a successful publish with zero
    /// receivers.
    pub async fn publish_message(&self, key: &str, message: M) -> PublishResult
    where
        M: Clone,
    {
        let normalized = key.to_lowercase();
        let maybe_bucket = self.core.snapshot().get(&normalized).cloned();
        match maybe_bucket {
            Some(bucket) => dispatch_to_snapshot(&bucket, key, message).await,
            None => PublishResult {
                receiver_count: 0,
                error: None,
            },
        }
    }

    /// Number of live subscriptions under `key` (case-insensitive).
    #[must_use]
    pub fn subscription_count(&self, key: &str) -> usize {
        self.core
            .snapshot()
            .get(&key.to_lowercase())
            .map_or(0, |subscriptions| subscriptions.len())
    }
}

impl<M: Send + 'static> Default for KeyedRouter<M> {
    fn default() -> Self { Self::new() }
}

impl<M: Send + 'static> std::fmt::Debug for KeyedRouter<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedRouter")
            .field("key_count", &self.core.snapshot().len())
            .finish_non_exhaustive()
    }
}

pub(crate) struct KeyedCore<M: Send + 'static> {
    registry_gate: Box<dyn AsyncMutex>,
    snapshot: StdRwLock<Arc<KeyedSnapshot<M>>>,
}

impl<M: Send + 'static> KeyedCore<M> {
    fn snapshot(&self) -> Arc<KeyedSnapshot<M>> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn store(&self, next: KeyedSnapshot<M>) {
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
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
        let current = self.snapshot();
        let mut next: KeyedSnapshot<M> = HashMap::with_capacity(current.len());
        for (key, subscriptions) in current.iter() {
            let remaining: Vec<Subscription<M>> = subscriptions
                .iter()
                .filter(|subscription| subscription.id != id)
                .cloned()
                .collect();
            if !remaining.is_empty() {
                next.insert(key.clone(), remaining.into());
            }
        }
        self.store(next);
        tracing::debug!(id, "keyed subscription released");
    }
}

fn guard_for<M: Send + 'static>(
    core: &Arc<KeyedCore<M>>,
    id: u64,
    key: String,
) -> SubscriptionGuard {
    let async_target = Arc::downgrade(core);
    let fallback_target = Arc::downgrade(core);
    SubscriptionGuard::new(
        key,
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
