// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! # r3bl_sync
//!
//! Cooperative asynchronous synchronization primitives for tokio programs: the
//! thread-blocking classics (mutex, reader/writer lock, bounded queue, one-shot
//! flag, pub/sub router) rebuilt so that waiting **parks a future instead of a
//! worker**. Waiters queue FIFO-fair as completion cells; state-change events
//! (release, cancellation, publication) walk the head of the queue and complete
//! exactly the right parked futures.
//!
//! Every suspending operation takes a [`CancellationToken`]. Cancellation is a
//! first-class state transition, not an afterthought: a cancelled waiter is unlinked
//! from its queue, and when cancellation races activation, ownership is handed to
//! the next waiter - never lost, never duplicated.
//!
//! ## The pieces, leaves first
//!
//! | Component                                      | What it is                                                        |
//! | :--------------------------------------------- | :---------------------------------------------------------------- |
//! | [`OnceFlag`]                                   | lock-free one-shot latch (one CAS, no allocation)                 |
//! | [`ScopedRelease`] / [`ScopedAsyncRelease`]     | idempotent release guards built on [`OnceFlag`]                   |
//! | [`SpinCasMutex`], [`MonitorMutex`], [`SemaphoreMutex`] | three interchangeable FIFO-fair mutexes, one [`AsyncMutex`] contract |
//! | [`ReaderWriterLock`]                           | writer-preferring four-phase state machine with reader batching   |
//! | [`BoundedAsyncQueue`]                          | two counting semaphores over an [`OrderedCollection`]             |
//! | [`ConsumingStream`]                            | single-consumer lazy sequence draining a queue                    |
//! | [`BroadcastRouter`], [`KeyedRouter`]           | pub/sub dispatch over copy-on-write subscriber snapshots          |
//! | [`MessageQueue`]                               | drop-oldest bounded sink bound to routers                         |
//!
//! The three mutex variants differ *only* in how they protect their internal waiter
//! queue - a spinning CAS with scheduler-cooperative backoff, an OS monitor, or a
//! one-permit semaphore. Pick by taste; swap freely.
//!
//! ## Example
//!
//! ```
//! use r3bl_sync::{CancellationToken, SpinCasMutex};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), r3bl_sync::SyncError> {
//! let mutex = SpinCasMutex::new();
//! let cancel = CancellationToken::new();
//!
//! let guard = mutex.lock(&cancel).await?;
//! // ... the critical section ...
//! drop(guard); // or guard.close() - releasing is idempotent either way
//! # Ok(())
//! # }
//! ```
//!
//! ## What this crate is not
//!
//! No reentrant locking, no read-to-write upgrade, no lock-ordering enforcement
//! across primitives, and the routers neither persist nor buffer (bind a
//! [`MessageQueue`] when you need buffering). Timeouts are not first-class: compose
//! a [`CancellationToken`] with a delay.

#![cfg_attr(not(test), deny(clippy::unwrap_in_result))]

// Attach sources.
pub mod errors;
pub mod flag;
pub mod gate;
pub mod mutex;
pub mod queue;
pub mod router;
pub mod rw_lock;
pub mod waiter;

// Re-export.
pub use errors::*;
pub use flag::*;
pub use gate::*;
pub use mutex::*;
pub use queue::*;
pub use router::*;
pub use rw_lock::*;
// Every suspending operation takes one of these; callers should not need a separate
// tokio-util import to use this crate.
pub use tokio_util::sync::CancellationToken;
pub use waiter::*;
