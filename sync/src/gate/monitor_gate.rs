// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! OS-monitor gate. See [`MonitorGate`].

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::InnerGate;

/// A gate backed by a native [`std::sync::Mutex`].
///
/// The cooperative [`enter`] degrades to the blocking acquire: with the crate-wide
/// hold-time bound (a few queue operations, no suspension inside the gate) the OS
/// monitor is only ever held for nanoseconds, so blocking on it does not stall a
/// worker in any way the scheduler can observe.
///
/// Poisoning is recovered with [`PoisonError::into_inner`]: the queue the gate
/// protects is consistent at every mutation boundary, so a panic elsewhere while the
/// gate was held cannot leave it half-updated.
///
/// [`enter`]: InnerGate::enter
#[derive(Debug)]
pub struct MonitorGate<T> {
    value: Mutex<T>,
}

impl<T: Send> InnerGate<T> for MonitorGate<T> {
    type Guard<'a>
        = MutexGuard<'a, T>
    where
        Self: 'a,
        T: 'a;

    fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }

    async fn enter<'a>(&'a self) -> Self::Guard<'a>
    where
        T: 'a,
    {
        self.enter_blocking()
    }

    fn enter_blocking(&self) -> Self::Guard<'_> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
