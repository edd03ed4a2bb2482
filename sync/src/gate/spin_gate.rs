// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Spinning CAS gate with scheduler-cooperative backoff. See [`SpinGate`].

use std::{cell::UnsafeCell,
          sync::{LazyLock,
                 atomic::{AtomicBool, Ordering}},
          time::Duration};

use crate::InnerGate;

/// Spin rounds (with [`spin_loop`] hints) before escalating to `yield_now`.
///
/// [`spin_loop`]: std::hint::spin_loop
const SPIN_ROUNDS: u32 = 6;

/// Yield rounds before escalating to short sleeps.
const YIELD_ROUNDS: u32 = 24;

/// Cap on the sleep-duration doubling exponent (`50µs << 4` = 800µs).
const MAX_SLEEP_EXPONENT: u32 = 4;

/// `false` on single-processor hosts, where spinning can never observe the gate
/// reopen and the only useful move is to yield immediately.
static MULTI_CORE: LazyLock<bool> = LazyLock::new(|| {
    std::thread::available_parallelism()
        .map(|n| n.get() > 1)
        .unwrap_or(true)
});

/// A gate protected by one atomic flag and an exponential-backoff CAS loop.
///
/// Contended [`enter`] calls escalate with the attempt count: spin-hint bursts of
/// doubling length, then [`tokio::task::yield_now`], then short sleeps of rising
/// duration. Single-processor hosts skip the spin phase entirely. The escalation
/// keeps a contended gate from monopolising a tokio worker while staying far cheaper
/// than an OS monitor in the common uncontended case.
///
/// All atomic operations use `SeqCst` (crate-wide convention).
///
/// [`enter`]: InnerGate::enter
#[derive(Debug)]
pub struct SpinGate<T> {
    closed: AtomicBool,
    value: UnsafeCell<T>,
}

// The atomic flag serializes access to `value`: a guard exists only after a
// successful false→true CAS, and the flag reopens only in the guard's drop.
unsafe impl<T: Send> Send for SpinGate<T> {}
unsafe impl<T: Send> Sync for SpinGate<T> {}

impl<T> SpinGate<T> {
    fn try_close(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// One backoff step for the given contended-attempt count.
    async fn backoff(round: u32) {
        if round < SPIN_ROUNDS && *MULTI_CORE {
            for _ in 0..(1_u32 << round) {
                std::hint::spin_loop();
            }
        } else if round < YIELD_ROUNDS {
            tokio::task::yield_now().await;
        } else {
            let exponent = (round - YIELD_ROUNDS).min(MAX_SLEEP_EXPONENT);
            tokio::time::sleep(Duration::from_micros(50 << exponent)).await;
        }
    }
}

impl<T: Send> InnerGate<T> for SpinGate<T> {
    type Guard<'a>
        = SpinGateGuard<'a, T>
    where
        Self: 'a,
        T: 'a;

    fn new(value: T) -> Self {
        Self {
            closed: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    async fn enter<'a>(&'a self) -> Self::Guard<'a>
    where
        T: 'a,
    {
        let mut round = 0_u32;
        loop {
            if self.try_close() {
                return SpinGateGuard { gate: self };
            }
            Self::backoff(round).await;
            round = round.saturating_add(1);
        }
    }

    fn enter_blocking(&self) -> Self::Guard<'_> {
        let mut round = 0_u32;
        loop {
            if self.try_close() {
                return SpinGateGuard { gate: self };
            }
            if round < SPIN_ROUNDS && *MULTI_CORE {
                for _ in 0..(1_u32 << round) {
                    std::hint::spin_loop();
                }
            } else {
                std::thread::yield_now();
            }
            round = round.saturating_add(1);
        }
    }
}

/// RAII guard for [`SpinGate`]; reopens the gate on drop.
#[derive(Debug)]
pub struct SpinGateGuard<'a, T> {
    gate: &'a SpinGate<T>,
}

impl<T> std::ops::Deref for SpinGateGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // A guard exists only while the gate is closed by its owner.
        unsafe { &*self.gate.value.get() }
    }
}

impl<T> std::ops::DerefMut for SpinGateGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.gate.value.get() }
    }
}

impl<T> Drop for SpinGateGuard<'_, T> {
    fn drop(&mut self) { self.gate.closed.store(false, Ordering::SeqCst); }
}
