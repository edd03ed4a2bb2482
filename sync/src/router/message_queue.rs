// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Drop-oldest bounded sink that binds to routers. See [`MessageQueue`].

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{BoundedAsyncQueue, BroadcastRouter, FifoCollection, KeyedRouter,
            MessageHandler, SubscriptionGuard, SyncError};

/// A message sink: binds to one or more routers under chosen keys and queues every
/// delivered message into an internal FIFO [`BoundedAsyncQueue`] for consumers to
/// take at their own pace.
///
/// When bounded and full, delivery drops the **oldest** queued element and retries
/// until the insert succeeds - slow consumers observe a gap, never backpressure on
/// the publisher.
///
/// The delivery handler holds only a [`Weak`] reference to the queue core, so
/// dropping the `MessageQueue` (even with bindings still registered) turns further
/// deliveries into no-ops.
pub struct MessageQueue<M: Clone + Send + 'static> {
    core: Arc<MessageQueueCore<M>>,
}

impl<M: Clone + Send + 'static> MessageQueue<M> {
    /// Creates a sink bounded at `capacity` messages (drop-oldest once full).
    ///
    /// # Errors
    ///
    /// [`SyncError::ZeroCapacity`] for `capacity == 0`.
    pub fn bounded(capacity: usize) -> Result<Self, SyncError> {
        Ok(Self {
            core: Arc::new(MessageQueueCore {
                queue: BoundedAsyncQueue::bounded(FifoCollection::new(), capacity)?,
            }),
        })
    }

    /// Creates an unbounded sink (nothing is ever dropped).
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            core: Arc::new(MessageQueueCore {
                queue: BoundedAsyncQueue::unbounded(FifoCollection::new()),
            }),
        }
    }

    /// Binds this sink to `router` under `key`: every message published under that
    /// key is enqueued here. Returns the subscription's release handle.
    ///
    /// # Errors
    ///
    /// As [`KeyedRouter::register_callback`].
    pub async fn bind(
        &self,
        key: &str,
        router: &KeyedRouter<M>,
        cancel: &CancellationToken,
    ) -> Result<SubscriptionGuard, SyncError> {
        router
            .register_callback(key, self.delivery_handler(), cancel)
            .await
    }

    /// Binds this sink to a broadcast router: every published message is enqueued
    /// here.
    ///
    /// # Errors
    ///
    /// As [`BroadcastRouter::register_callback`].
    pub async fn bind_broadcast(
        &self,
        router: &BroadcastRouter<M>,
        cancel: &CancellationToken,
    ) -> Result<SubscriptionGuard, SyncError> {
        router
            .register_callback(self.delivery_handler(), cancel)
            .await
    }

    /// Takes the next queued message, suspending while the sink is empty.
    ///
    /// # Errors
    ///
    /// [`SyncError::Cancelled`] if `cancel` was already triggered or fires while
    /// suspended.
    pub async fn take_message(&self, cancel: &CancellationToken) -> Result<M, SyncError> {
        self.core.queue.take(cancel).await
    }

    /// Non-suspending take attempt.
    pub fn try_take_message(&self) -> Option<M> { self.core.queue.try_take() }

    /// Number of messages currently queued.
    #[must_use]
    pub fn count(&self) -> usize { self.core.queue.count() }

    /// Each binding gets its own handler `Arc`, so one sink can bind to the same
    /// router key more than once without tripping duplicate-identity detection.
    fn delivery_handler(&self) -> Arc<dyn MessageHandler<M>> {
        Arc::new(DeliveryHandler {
            core: Arc::downgrade(&self.core),
        })
    }
}

impl<M: Clone + Send + 'static> std::fmt::Debug for MessageQueue<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("count", &self.count())
            .field("capacity", &self.core.queue.capacity())
            .finish_non_exhaustive()
    }
}

struct MessageQueueCore<M: Clone + Send + 'static> {
    queue: BoundedAsyncQueue<FifoCollection<M>>,
}

struct DeliveryHandler<M: Clone + Send + 'static> {
    core: Weak<MessageQueueCore<M>>,
}

#[async_trait]
impl<M: Clone + Send + 'static> MessageHandler<M> for DeliveryHandler<M> {
    async fn handle(&self, _key: &str, message: M) -> miette::Result<()> {
        // A reclaimed sink silently stops consuming its bindings.
        let Some(core) = self.core.upgrade() else {
            return Ok(());
        };

        loop {
            if core.queue.try_add(message.clone()) {
                return Ok(());
            }
            // Full: evict the oldest element, then retry the insert. Concurrent
            // consumers may win the eviction race; yield and try again.
            match core.queue.try_take() {
                Some(_evicted) => {
                    tracing::debug!("message queue full; dropped oldest element");
                }
                None => tokio::task::yield_now().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[tokio::test]
    async fn bound_sink_receives_published_messages() {
        let router = KeyedRouter::new();
        let sink = MessageQueue::bounded(8).unwrap();
        let cancel = CancellationToken::new();

        let _binding = sink.bind("events", &router, &cancel).await.unwrap();

        let first = router.publish_message("events", 1_u64).await;
        let second = router.publish_message("events", 2_u64).await;
        assert!(first.is_ok() && second.is_ok());

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.take_message(&cancel).await.unwrap(), 1);
        assert_eq!(sink.try_take_message(), Some(2));
        assert_eq!(sink.try_take_message(), None);
    }

    /// Drop-oldest policy: publishing past the capacity keeps only the newest
    /// messages, in order.
    #[tokio::test]
    async fn full_sink_drops_the_oldest_message() {
        let router = KeyedRouter::new();
        let sink = MessageQueue::bounded(2).unwrap();
        let cancel = CancellationToken::new();

        let _binding = sink.bind("ticks", &router, &cancel).await.unwrap();

        for tick in 1..=5_u64 {
            let result = router.publish_message("ticks", tick).await;
            assert!(result.is_ok());
        }

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.try_take_message(), Some(4));
        assert_eq!(sink.try_take_message(), Some(5));
    }

    #[tokio::test]
    async fn broadcast_binding_receives_everything() {
        let router = BroadcastRouter::new();
        let sink = MessageQueue::unbounded();
        let cancel = CancellationToken::new();

        let _binding = sink.bind_broadcast(&router, &cancel).await.unwrap();

        let first = router.publish_message("", "alpha").await;
        let second = router.publish_message("ignored-by-broadcast", "beta").await;
        assert_eq!(first.receiver_count + second.receiver_count, 2);

        assert_eq!(sink.try_take_message(), Some("alpha"));
        assert_eq!(sink.try_take_message(), Some("beta"));
    }

    #[tokio::test]
    async fn one_sink_can_bind_to_several_keys() {
        let router = KeyedRouter::new();
        let sink = MessageQueue::bounded(8).unwrap();
        let cancel = CancellationToken::new();

        let _first = sink.bind("a", &router, &cancel).await.unwrap();
        let _second = sink.bind("b", &router, &cancel).await.unwrap();

        let on_a = router.publish_message("a", 1_u64).await;
        let on_b = router.publish_message("b", 2_u64).await;
        let on_c = router.publish_message("c", 3_u64).await;

        assert_eq!(on_a.receiver_count, 1);
        assert_eq!(on_b.receiver_count, 1);
        assert_eq!(on_c.receiver_count, 0);
        assert_eq!(sink.count(), 2);
    }

    #[tokio::test]
    async fn dropped_sink_turns_delivery_into_a_no_op() {
        let router = KeyedRouter::new();
        let cancel = CancellationToken::new();

        let _binding = {
            let sink = MessageQueue::<u64>::bounded(4).unwrap();
            sink.bind("orphan", &router, &cancel).await.unwrap()
            // `sink` drops here; the binding stays registered.
        };

        let result = router.publish_message("orphan", 9).await;
        assert_eq!(result.receiver_count, 1);
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn consumer_parks_until_a_message_arrives() {
        let router = Arc::new(KeyedRouter::new());
        let sink = Arc::new(MessageQueue::bounded(4).unwrap());
        let cancel = CancellationToken::new();

        let _binding = sink.bind("late", &router, &cancel).await.unwrap();

        let consumer = {
            let sink = Arc::clone(&sink);
            tokio::spawn(async move {
                sink.take_message(&CancellationToken::new()).await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        let delivered = router.publish_message("late", 11_u64).await;
        assert_eq!(delivered.receiver_count, 1);
        assert_eq!(consumer.await.unwrap().unwrap(), 11);
    }
}
