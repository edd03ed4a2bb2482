// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The short critical section protecting a primitive's waiter queue. See
//! [`InnerGate`].

use std::ops::DerefMut;

/// A short critical section owning the data it protects.
///
/// The FIFO mutex variants differ *only* in their gate ([`SpinGate`] vs
/// [`MonitorGate`]); the waiter algorithm is written once against this trait. Gate
/// hold times are a handful of queue operations - nothing inside a gate ever
/// suspends, allocates unboundedly, or calls external code.
///
/// Two entry points:
///
/// - [`enter`]: the cooperative entry used on acquisition paths. It may suspend (the
///   spin gate escalates to `yield`/`sleep`), so waiting for the gate never
///   monopolises a worker.
/// - [`enter_blocking`]: the non-async entry used on release paths, where Rust
///   destructors cannot await. Contention is resolved with a bounded spin/yield loop;
///   given the hold-time bound above this waits nanoseconds, not quanta.
///
/// [`MonitorGate`]: crate::MonitorGate
/// [`SpinGate`]: crate::SpinGate
/// [`enter`]: Self::enter
/// [`enter_blocking`]: Self::enter_blocking
pub trait InnerGate<T>: Send + Sync {
    /// RAII guard; the gate reopens when the guard drops.
    type Guard<'a>: DerefMut<Target = T>
    where
        Self: 'a,
        T: 'a;

    /// Creates a closed-over gate owning `value`.
    fn new(value: T) -> Self;

    /// Cooperative entry; never blocks a worker while contended.
    fn enter<'a>(&'a self) -> impl Future<Output = Self::Guard<'a>> + Send
    where
        T: 'a;

    /// Non-async entry for release paths (bounded wait).
    fn enter_blocking(&self) -> Self::Guard<'_>;
}
