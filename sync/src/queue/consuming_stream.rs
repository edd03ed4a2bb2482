// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Lazy single-consumer sequence over a [`BoundedAsyncQueue`]. See
//! [`ConsumingStream`].

use std::{pin::Pin,
          sync::atomic::{AtomicBool, Ordering},
          task::{Context, Poll}};

use futures_core::Stream;
use tokio_util::sync::CancellationToken;

use crate::{BoundedAsyncQueue, OrderedCollection, SyncError};

impl<C: OrderedCollection> BoundedAsyncQueue<C> {
    /// Claims the queue's single consumer seat and returns a lazy sequence whose
    /// every step is a [`take`] against a child of `cancel`.
    ///
    /// The stream yields `Ok(item)` per element and terminates with one
    /// `Err(Cancelled)` item when `cancel` (or the internal child token) fires.
    /// Dropping the stream cancels the child token and releases the consumer seat,
    /// so a replacement stream can be created afterwards.
    ///
    /// # Errors
    ///
    /// [`SyncError::StreamAlreadyConsuming`] while another stream from this queue is
    /// still live - the sequence is strictly single-consumer.
    ///
    /// [`take`]: BoundedAsyncQueue::take
    pub fn consuming_stream(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ConsumingStream<'_, C>, SyncError> {
        let claimed = self
            .consumer_claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if !claimed {
            return Err(SyncError::StreamAlreadyConsuming);
        }

        let stop = cancel.child_token();
        let claim = ConsumerClaim {
            claimed: &self.consumer_claimed,
            stop: stop.clone(),
        };

        let inner = async_stream::stream! {
            // Moved into the stream so dropping it (at exhaustion or mid-iteration)
            // cancels the child token and releases the consumer seat.
            let _claim = claim;
            loop {
                match self.take(&stop).await {
                    Ok(item) => yield Ok(item),
                    Err(error) => {
                        yield Err(error);
                        break;
                    }
                }
            }
        };

        Ok(ConsumingStream {
            inner: Box::pin(inner),
        })
    }
}

/// The lazy sequence returned by [`BoundedAsyncQueue::consuming_stream`].
pub struct ConsumingStream<'a, C: OrderedCollection> {
    inner: Pin<Box<dyn Stream<Item = Result<C::Item, SyncError>> + Send + 'a>>,
}

impl<C: OrderedCollection> Stream for ConsumingStream<'_, C> {
    type Item = Result<C::Item, SyncError>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl<C: OrderedCollection> std::fmt::Debug for ConsumingStream<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumingStream").finish_non_exhaustive()
    }
}

/// Moved into the stream body; its drop runs when the stream is dropped or
/// exhausted.
struct ConsumerClaim<'a> {
    claimed: &'a AtomicBool,
    stop: CancellationToken,
}

impl Drop for ConsumerClaim<'_> {
    fn drop(&mut self) {
        self.stop.cancel();
        self.claimed.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FifoCollection;
    use futures_util::StreamExt;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn cancel_after(duration: Duration) -> CancellationToken {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            trigger.cancel();
        });
        token
    }

    /// Termination: three pre-filled elements iterate successfully; the fourth step
    /// (empty queue, deadline-composed token) yields Cancelled and ends the stream.
    #[tokio::test]
    async fn stream_drains_then_cancels_on_empty() {
        let collection: FifoCollection<u32> = [1, 2, 3].into_iter().collect();
        let queue = BoundedAsyncQueue::bounded(collection, 3).unwrap();

        let cancel = cancel_after(Duration::from_millis(100));
        let mut stream = queue.consuming_stream(&cancel).unwrap();

        for expected in [1, 2, 3] {
            assert_eq!(stream.next().await.unwrap().unwrap(), expected);
        }

        let fourth = stream.next().await.unwrap();
        assert!(matches!(fourth, Err(SyncError::Cancelled)));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn parallel_iteration_is_rejected() {
        let queue =
            BoundedAsyncQueue::bounded(FifoCollection::<u32>::new(), 4).unwrap();
        let cancel = CancellationToken::new();

        let live = queue.consuming_stream(&cancel).unwrap();
        let second = queue.consuming_stream(&cancel);
        assert!(matches!(second, Err(SyncError::StreamAlreadyConsuming)));

        // Dropping the live stream releases the single-consumer seat.
        drop(live);
        assert!(queue.consuming_stream(&cancel).is_ok());
    }

    #[tokio::test]
    async fn stream_sees_elements_added_while_iterating() {
        let queue = std::sync::Arc::new(
            BoundedAsyncQueue::bounded(FifoCollection::new(), 4).unwrap(),
        );
        let cancel = CancellationToken::new();

        let feeder = {
            let queue = std::sync::Arc::clone(&queue);
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                for value in [10, 20] {
                    tokio::time::sleep(Duration::from_millis(15)).await;
                    queue.add(value, &cancel).await.unwrap();
                }
            })
        };

        let mut stream = queue.consuming_stream(&cancel).unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), 10);
        assert_eq!(stream.next().await.unwrap().unwrap(), 20);

        drop(stream);
        feeder.await.unwrap();
    }

    /// Dropping the stream cancels its internal child token without touching the
    /// caller's token.
    #[tokio::test]
    async fn dropping_the_stream_leaves_the_callers_token_alone() {
        let queue =
            BoundedAsyncQueue::bounded(FifoCollection::<u32>::new(), 4).unwrap();
        let cancel = CancellationToken::new();

        let stream = queue.consuming_stream(&cancel).unwrap();
        drop(stream);

        assert!(!cancel.is_cancelled());
        // Seat released: queue operations still work.
        assert!(queue.try_add(1));
        assert_eq!(queue.try_take(), Some(1));
    }
}
