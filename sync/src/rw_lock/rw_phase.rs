// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The tagged phase of the reader/writer state machine. See [`RwPhase`].

/// The four phases of [`ReaderWriterLock`]. Transitions are total and live in one
/// place ([`RwState`]); no call site dispatches on phase-specific behavior.
///
/// Per-phase structural invariants (checked after every transition; violation is a
/// fatal bug):
///
/// | Phase          | `reading` | `pending_writers`        | `pending_readers` |
/// | :------------- | :-------- | :----------------------- | :---------------- |
/// | `Idle`         | empty     | empty                    | empty             |
/// | `Reading`      | non-empty | empty                    | empty             |
/// | `PendingWrite` | non-empty | non-empty (head parked)  | any               |
/// | `Writing`      | empty     | non-empty (head holds)   | any               |
///
/// [`ReaderWriterLock`]: crate::ReaderWriterLock
/// [`RwState`]: crate::RwState
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum RwPhase {
    /// No readers, no writers, nothing queued.
    Idle,
    /// One or more active readers; no writer queued.
    Reading,
    /// Active readers draining while at least one writer waits; late readers park.
    PendingWrite,
    /// The head queued writer holds the lock exclusively.
    Writing,
}
