// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Lock-free one-shot latch. See [`OnceFlag`].

use std::sync::atomic::{AtomicBool, Ordering};

/// A two-state latch that transitions `Unset → Set` exactly once.
///
/// The flag is monotonic: it can never be reset. Under unbounded concurrent callers,
/// exactly one [`try_set`] call observes `true`; every later call observes `false`.
/// This is the building block behind every idempotent-release guard in this crate
/// (see [`ScopedRelease`]).
///
/// Implementation floor: a single atomic word mutated with one compare-exchange. No
/// allocation, no suspension. All atomic operations use [`SeqCst`] ordering so callers
/// never have to choose (same convention as the rest of this crate).
///
/// The compare-exchange succeeds iff the *previous* value was unset - not iff the
/// stored value ends up set. The distinction matters under contention: the loser of
/// the race sees the flag already set and must report `false`.
///
/// [`SeqCst`]: Ordering::SeqCst
/// [`ScopedRelease`]: crate::ScopedRelease
/// [`try_set`]: Self::try_set
#[derive(Debug, Default)]
pub struct OnceFlag {
    state: AtomicBool,
}

impl OnceFlag {
    /// Creates a new flag in the `Unset` state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicBool::new(false),
        }
    }

    /// Reads the current state without mutating it.
    #[must_use]
    pub fn is_set(&self) -> bool { self.state.load(Ordering::SeqCst) }

    /// Atomically flips `Unset → Set`. Returns `true` on the unique transition,
    /// `false` forever after.
    pub fn try_set(&self) -> bool {
        self.state
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}
