// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! [RAII] guard that runs a release action at most once. See [`ScopedRelease`].
//!
//! [RAII]: https://en.wikipedia.org/wiki/Resource_acquisition_is_initialization

use crate::OnceFlag;

/// An idempotent release guard: holds a release action and runs it at most once, on
/// [`close`] or on drop, whichever comes first.
///
/// Every release handle in this crate ([`MutexReleaseGuard`], the reader/writer
/// guards, the subscription guards) is built on this type, which is what makes
/// "N releases of the same handle produce exactly one effective release" hold
/// crate-wide. The at-most-once property is enforced by an embedded [`OnceFlag`], so
/// it holds even if [`close`] races the destructor on another thread's unwind path.
///
/// The action must not suspend; it runs synchronously inside [`close`] and inside
/// [`Drop`]. For release actions that need to await, see [`ScopedAsyncRelease`].
///
/// Dropping the guard releases: this is the "runs on any exit path" half of the
/// contract, covering early returns, `?` propagation, panics, and task cancellation
/// (a cancelled tokio task drops its locals).
///
/// [`Drop`]: Self#impl-Drop-for-ScopedRelease
/// [`MutexReleaseGuard`]: crate::MutexReleaseGuard
/// [`ScopedAsyncRelease`]: crate::ScopedAsyncRelease
/// [`close`]: Self::close
#[must_use = "dropping a release guard immediately runs the release action"]
pub struct ScopedRelease {
    released: OnceFlag,
    action: Option<Box<dyn FnOnce() + Send>>,
}

impl ScopedRelease {
    /// Wraps `action` so it runs at most once.
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            released: OnceFlag::new(),
            action: Some(Box::new(action)),
        }
    }

    /// Runs the release action if it has not run yet. Idempotent.
    pub fn close(&mut self) {
        if self.released.try_set() {
            if let Some(action) = self.action.take() {
                action();
            }
        }
    }

    /// Whether the release action has already run.
    #[must_use]
    pub fn is_released(&self) -> bool { self.released.is_set() }
}

impl Drop for ScopedRelease {
    fn drop(&mut self) { self.close(); }
}

impl std::fmt::Debug for ScopedRelease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedRelease")
            .field("released", &self.released.is_set())
            .finish_non_exhaustive()
    }
}
