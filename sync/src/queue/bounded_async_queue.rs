// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Capacity-bounded async producer/consumer queue. See [`BoundedAsyncQueue`].

use std::sync::atomic::AtomicBool;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::{OrderedCollection, SyncError};

/// A producer/consumer queue built from two counting semaphores over an ordered
/// collection.
///
/// `items` counts elements available to take; `slots` counts free capacity (absent
/// when unbounded). The semaphores carry the parking/fairness discipline
/// ([`tokio::sync::Semaphore`] queues acquirers fairly); the collection carries the
/// element order. Invariants: `items == collection.len()`, and when bounded
/// `items + slots == capacity`.
///
/// Producers suspend in [`add`] when the queue is full; consumers suspend in [`take`]
/// when it is empty. Both race their semaphore acquire against the cancellation
/// token; an abandoned acquire leaves the semaphore's queue automatically, so
/// cancellation needs no state restoration here.
///
/// [`add`]: Self::add
/// [`take`]: Self::take
#[derive(Debug)]
pub struct BoundedAsyncQueue<C: OrderedCollection> {
    collection: C,
    items: Semaphore,
    slots: Option<Semaphore>,
    capacity: Option<usize>,
    pub(crate) consumer_claimed: AtomicBool,
}

impl<C: OrderedCollection> BoundedAsyncQueue<C> {
    /// Creates a queue bounded at `capacity` elements over `collection` (which may be
    /// pre-filled; its elements count against the capacity).
    ///
    /// # Errors
    ///
    /// [`SyncError::ZeroCapacity`] for `capacity == 0`;
    /// [`SyncError::InitialSizeExceedsCapacity`] when the collection is already over
    /// the limit.
    pub fn bounded(collection: C, capacity: usize) -> Result<Self, SyncError> {
        if capacity == 0 {
            return Err(SyncError::ZeroCapacity);
        }
        let initial = collection.len();
        if initial > capacity {
            return Err(SyncError::InitialSizeExceedsCapacity { initial, capacity });
        }
        Ok(Self {
            collection,
            items: Semaphore::new(initial),
            slots: Some(Semaphore::new(capacity - initial)),
            capacity: Some(capacity),
            consumer_claimed: AtomicBool::new(false),
        })
    }

    /// Creates an unbounded queue over `collection`: [`add`] never suspends for
    /// space.
    ///
    /// [`add`]: Self::add
    pub fn unbounded(collection: C) -> Self {
        let initial = collection.len();
        Self {
            collection,
            items: Semaphore::new(initial),
            slots: None,
            capacity: None,
            consumer_claimed: AtomicBool::new(false),
        }
    }

    /// Inserts an element, suspending while the queue is full. Returns `false` when
    /// the backing collection rejected the element (its reserved slot is released).
    ///
    /// # Errors
    ///
    /// [`SyncError::Cancelled`] if `cancel` was already triggered or fires while
    /// suspended.
    pub async fn add(
        &self,
        item: C::Item,
        cancel: &CancellationToken,
    ) -> Result<bool, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        if let Some(slots) = &self.slots {
            tokio::select! {
                acquired = slots.acquire() => match acquired {
                    Ok(permit) => permit.forget(),
                    Err(_closed) => unreachable!("queue slots semaphore closed"),
                },
                () = cancel.cancelled() => return Err(SyncError::Cancelled),
            }
        }

        Ok(self.finish_add(item))
    }

    /// Non-suspending insert attempt: `false` when the queue is full or the backing
    /// collection rejected the element.
    pub fn try_add(&self, item: C::Item) -> bool {
        if let Some(slots) = &self.slots {
            match slots.try_acquire() {
                Ok(permit) => permit.forget(),
                Err(_no_slot) => return false,
            }
        }
        self.finish_add(item)
    }

    /// Removes the next element in collection order, suspending while the queue is
    /// empty.
    ///
    /// # Errors
    ///
    /// [`SyncError::Cancelled`] if `cancel` was already triggered or fires while
    /// suspended.
    pub async fn take(&self, cancel: &CancellationToken) -> Result<C::Item, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        tokio::select! {
            acquired = self.items.acquire() => match acquired {
                Ok(permit) => permit.forget(),
                Err(_closed) => unreachable!("queue items semaphore closed"),
            },
            () = cancel.cancelled() => return Err(SyncError::Cancelled),
        }

        Ok(self.finish_take())
    }

    /// Non-suspending take attempt.
    pub fn try_take(&self) -> Option<C::Item> {
        match self.items.try_acquire() {
            Ok(permit) => permit.forget(),
            Err(_empty) => return None,
        }
        Some(self.finish_take())
    }

    /// Number of elements currently takeable (the value of the `items` semaphore).
    #[must_use]
    pub fn count(&self) -> usize { self.items.available_permits() }

    /// The capacity bound, or [`None`] for an unbounded queue.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> { self.capacity }

    /// Completes an insert after a slot was reserved (or for unbounded queues,
    /// directly): on success the element becomes takeable; on rejection the reserved
    /// slot is handed back.
    fn finish_add(&self, item: C::Item) -> bool {
        match self.collection.try_add(item) {
            Ok(()) => {
                self.items.add_permits(1);
                true
            }
            Err(_rejected) => {
                if let Some(slots) = &self.slots {
                    slots.add_permits(1);
                }
                false
            }
        }
    }

    /// Completes a take after an item permit was consumed.
    ///
    /// # Panics
    ///
    /// If the collection is empty despite the permit: the `items == collection.len()`
    /// invariant is broken, which is fatal.
    fn finish_take(&self) -> C::Item {
        let Some(item) = self.collection.try_take() else {
            panic!("items permit held but the backing collection is empty");
        };
        if let Some(slots) = &self.slots {
            slots.add_permits(1);
        }
        item
    }
}
