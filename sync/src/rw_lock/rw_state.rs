// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Transition functions of the reader/writer state machine. See [`RwState`].
//!
//! Every function here runs under the lock's single internal critical section; none
//! of them suspends or calls external code. Keeping all transitions in this one file
//! keeps them total and auditable against the phase table on [`RwPhase`].

use std::{collections::VecDeque, sync::Arc};

use smallvec::SmallVec;

use crate::{RwPhase, WaiterCell, WaiterStatus};

/// The three waiter lists plus the tagged phase.
///
/// `reading` holds currently-active readers. `pending_writers` holds queued writers -
/// during [`Writing`] its head is the active writer; during [`PendingWrite`] its head
/// is parked waiting for readers to drain. `pending_readers` holds readers that
/// arrived after a writer queued.
///
/// [`PendingWrite`]: RwPhase::PendingWrite
/// [`Writing`]: RwPhase::Writing
#[derive(Debug)]
pub struct RwState {
    pub(crate) phase: RwPhase,
    pub(crate) reading: SmallVec<[Arc<WaiterCell>; 4]>,
    pub(crate) pending_readers: VecDeque<Arc<WaiterCell>>,
    pub(crate) pending_writers: VecDeque<Arc<WaiterCell>>,
}

impl Default for RwState {
    fn default() -> Self {
        Self {
            phase: RwPhase::Idle,
            reading: SmallVec::new(),
            pending_readers: VecDeque::new(),
            pending_writers: VecDeque::new(),
        }
    }
}

impl RwState {
    /// Inbound `wait_for_read` request.
    pub(crate) fn admit_reader(&mut self, waiter: Arc<WaiterCell>) {
        match self.phase {
            RwPhase::Idle => {
                activate_fresh(&waiter);
                self.reading.push(waiter);
                self.phase = RwPhase::Reading;
            }
            RwPhase::Reading => {
                activate_fresh(&waiter);
                self.reading.push(waiter);
            }
            // Writer-preferring: once a writer is queued, new readers park.
            RwPhase::PendingWrite | RwPhase::Writing => {
                self.pending_readers.push_back(waiter);
            }
        }
        self.assert_phase_invariants();
    }

    /// Inbound `wait_for_write` request.
    pub(crate) fn admit_writer(&mut self, waiter: Arc<WaiterCell>) {
        match self.phase {
            RwPhase::Idle => {
                activate_fresh(&waiter);
                self.pending_writers.push_back(waiter);
                self.phase = RwPhase::Writing;
            }
            RwPhase::Reading => {
                self.pending_writers.push_back(waiter);
                self.phase = RwPhase::PendingWrite;
            }
            RwPhase::PendingWrite | RwPhase::Writing => {
                self.pending_writers.push_back(waiter);
            }
        }
        self.assert_phase_invariants();
    }

    /// Release of an active reader (explicit, dropped guard, or a cancellation that
    /// lost the activation race).
    pub(crate) fn release_reader(&mut self, waiter: &Arc<WaiterCell>) {
        let Some(index) = self.reading.iter().position(|w| Arc::ptr_eq(w, waiter))
        else {
            return;
        };
        self.reading.remove(index);
        if self.reading.is_empty() {
            self.on_reading_drained();
        }
        self.assert_phase_invariants();
    }

    /// Release of the active writer (explicit, dropped guard, or a cancellation that
    /// lost the activation race).
    pub(crate) fn release_writer(&mut self, waiter: &Arc<WaiterCell>) {
        let Some(index) = self
            .pending_writers
            .iter()
            .position(|w| Arc::ptr_eq(w, waiter))
        else {
            return;
        };
        debug_assert_eq!(index, 0, "the active writer is the head queued writer");
        self.pending_writers.remove(index);
        self.after_writer_exit();
        self.assert_phase_invariants();
    }

    /// Unlinks a reader whose cancellation won before activation. A parked reader is
    /// never structural, so no phase transition can result.
    pub(crate) fn unlink_cancelled_reader(&mut self, waiter: &Arc<WaiterCell>) {
        if let Some(index) = self
            .pending_readers
            .iter()
            .position(|w| Arc::ptr_eq(w, waiter))
        {
            self.pending_readers.remove(index);
        }
        self.assert_phase_invariants();
    }

    /// Unlinks a writer whose cancellation won before activation. Removing the *last*
    /// queued writer during [`PendingWrite`] is the structural event that un-strands
    /// the parked readers that arrived behind it: they merge into `reading` and
    /// activate as a batch.
    ///
    /// [`PendingWrite`]: RwPhase::PendingWrite
    pub(crate) fn unlink_cancelled_writer(&mut self, waiter: &Arc<WaiterCell>) {
        let Some(index) = self
            .pending_writers
            .iter()
            .position(|w| Arc::ptr_eq(w, waiter))
        else {
            // Already discarded by an activation walk.
            self.assert_phase_invariants();
            return;
        };
        self.pending_writers.remove(index);

        if self.phase == RwPhase::PendingWrite && self.pending_writers.is_empty() {
            tracing::debug!(
                "last queued writer cancelled during PendingWrite; merging parked \
                 readers"
            );
            self.merge_pending_readers();
            debug_assert!(!self.reading.is_empty());
            self.phase = RwPhase::Reading;
        }
        self.assert_phase_invariants();
    }

    /// The last active reader left; decide what runs next.
    fn on_reading_drained(&mut self) {
        match self.phase {
            RwPhase::Reading => {
                self.phase = RwPhase::Idle;
            }
            RwPhase::PendingWrite => {
                if self.activate_head_writer() {
                    self.phase = RwPhase::Writing;
                } else {
                    // Every queued writer lost a cancellation race while we held the
                    // critical section; fall back to the parked readers.
                    self.merge_pending_readers();
                    self.phase = if self.reading.is_empty() {
                        RwPhase::Idle
                    } else {
                        RwPhase::Reading
                    };
                }
            }
            RwPhase::Idle | RwPhase::Writing => {
                panic!(
                    "reader released during {} phase: reader/writer invariant \
                     violated",
                    self.phase
                );
            }
        }
    }

    /// The active writer left (release or lost-race cancellation); decide what runs
    /// next: another writer, the parked reader batch, or nothing.
    fn after_writer_exit(&mut self) {
        if self.activate_head_writer() {
            self.phase = RwPhase::Writing;
            return;
        }
        self.merge_pending_readers();
        self.phase = if self.reading.is_empty() {
            RwPhase::Idle
        } else {
            RwPhase::Reading
        };
    }

    /// Activates the first still-pending queued writer, discarding any that lost
    /// cancellation races. Returns `false` when no writer remains.
    fn activate_head_writer(&mut self) -> bool {
        while let Some(head) = self.pending_writers.front() {
            if head.try_complete(WaiterStatus::Activated) {
                return true;
            }
            self.pending_writers.pop_front();
        }
        false
    }

    /// Batch-activates the parked readers into `reading`, in list order. Readers that
    /// lost cancellation races are dropped.
    fn merge_pending_readers(&mut self) {
        for waiter in self.pending_readers.drain(..) {
            if waiter.try_complete(WaiterStatus::Activated) {
                self.reading.push(waiter);
            }
        }
    }

    /// Fatal check of the per-phase structural invariants (see the table on
    /// [`RwPhase`]).
    pub(crate) fn assert_phase_invariants(&self) {
        let ok = match self.phase {
            RwPhase::Idle => {
                self.reading.is_empty()
                    && self.pending_readers.is_empty()
                    && self.pending_writers.is_empty()
            }
            RwPhase::Reading => {
                !self.reading.is_empty()
                    && self.pending_readers.is_empty()
                    && self.pending_writers.is_empty()
            }
            RwPhase::PendingWrite => {
                !self.reading.is_empty() && !self.pending_writers.is_empty()
            }
            RwPhase::Writing => {
                self.reading.is_empty() && !self.pending_writers.is_empty()
            }
        };
        assert!(
            ok,
            "reader/writer phase invariant violated in {} (reading={}, \
             pending_readers={}, pending_writers={})",
            self.phase,
            self.reading.len(),
            self.pending_readers.len(),
            self.pending_writers.len(),
        );
    }
}

/// Activates a waiter that was created in this critical section and cannot have a
/// competing completer yet.
fn activate_fresh(waiter: &Arc<WaiterCell>) {
    let activated = waiter.try_complete(WaiterStatus::Activated);
    debug_assert!(activated, "freshly admitted waiter already completed");
}
