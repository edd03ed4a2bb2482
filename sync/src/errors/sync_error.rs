// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Structural error taxonomy for every primitive in this crate. See [`SyncError`].

/// Errors surfaced by the suspending and constructing operations of this crate.
///
/// The taxonomy is structural, not string-typed. Each variant maps to one error kind:
///
/// | Variant                                     | Kind            | Raised by                                         |
/// | :------------------------------------------ | :-------------- | :------------------------------------------------ |
/// | [`Cancelled`]                               | Cancelled       | any suspending operation whose token fired        |
/// | [`ZeroCapacity`]                            | InvalidArgument | bounded queue construction with capacity `0`      |
/// | [`InitialSizeExceedsCapacity`]              | InvalidArgument | bounded queue construction over a full collection |
/// | [`EmptyBindingKey`]                         | InvalidArgument | keyed router registration with an empty key       |
/// | [`DuplicateSubscription`]                   | InvalidState    | re-registering the same `(key, handler)` pair     |
/// | [`StreamAlreadyConsuming`]                  | InvalidState    | claiming a second live consuming stream           |
///
/// Handler failures during a publish are *not* part of this enum: they are folded into
/// [`HandlerAggregateError`] and returned inside [`PublishResult`], never raised.
/// Invariant violations (Fatal kind) panic instead of returning; see the phase
/// predicates on [`ReaderWriterLock`].
///
/// [`Cancelled`]: Self::Cancelled
/// [`DuplicateSubscription`]: Self::DuplicateSubscription
/// [`EmptyBindingKey`]: Self::EmptyBindingKey
/// [`HandlerAggregateError`]: crate::HandlerAggregateError
/// [`InitialSizeExceedsCapacity`]: Self::InitialSizeExceedsCapacity
/// [`PublishResult`]: crate::PublishResult
/// [`ReaderWriterLock`]: crate::ReaderWriterLock
/// [`StreamAlreadyConsuming`]: Self::StreamAlreadyConsuming
/// [`ZeroCapacity`]: Self::ZeroCapacity
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum SyncError {
    /// The operation's [`CancellationToken`] fired before (or while) the caller was
    /// parked. The primitive's state has been restored: the caller's waiter was removed
    /// and, if it had already been activated, ownership was handed to the next waiter.
    ///
    /// [`CancellationToken`]: tokio_util::sync::CancellationToken
    #[error("operation cancelled")]
    #[diagnostic(
        code(r3bl_sync::cancelled),
        help(
            "The cancellation token passed into this operation fired. This is a \
             cooperative outcome, not a failure of the primitive."
        )
    )]
    Cancelled,

    /// A bounded queue was constructed with capacity `0`.
    #[error("bounded queue capacity must be greater than zero")]
    #[diagnostic(
        code(r3bl_sync::zero_capacity),
        help("Use the unbounded constructor if you do not want a capacity limit.")
    )]
    ZeroCapacity,

    /// The backing collection already holds more elements than the requested capacity.
    #[error("initial collection size {initial} exceeds the requested capacity {capacity}")]
    #[diagnostic(
        code(r3bl_sync::initial_size_exceeds_capacity),
        help("Pre-filled elements count against the capacity; raise the capacity or \
              shrink the collection.")
    )]
    InitialSizeExceedsCapacity {
        /// Number of elements in the collection at construction time.
        initial: usize,
        /// The requested capacity.
        capacity: usize,
    },

    /// A keyed router registration was attempted with an empty binding key.
    #[error("binding key must not be empty")]
    #[diagnostic(
        code(r3bl_sync::empty_binding_key),
        help("Keyed routers dispatch by key; use a broadcast router for key-less fanout.")
    )]
    EmptyBindingKey,

    /// The same `(key, handler)` pair was registered twice (handler identity is pointer
    /// identity of the `Arc`).
    #[error("handler is already registered under binding key {key:?}")]
    #[diagnostic(
        code(r3bl_sync::duplicate_subscription),
        help(
            "Release the existing subscription before re-registering, or wrap the \
             handler in a fresh Arc if distinct delivery is intended."
        )
    )]
    DuplicateSubscription {
        /// The (normalized) binding key the handler is already registered under.
        key: String,
    },

    /// A second consuming stream was requested while one is still live. The queue's
    /// consuming stream is single-consumer; drop the existing stream first.
    #[error("a consuming stream is already active for this queue")]
    #[diagnostic(
        code(r3bl_sync::stream_already_consuming),
        help("Drop the previous stream (which also cancels its internal token) before \
              starting a new one.")
    )]
    StreamAlreadyConsuming,
}

impl SyncError {
    /// `true` for the [`Cancelled`] variant. Convenience for callers that treat
    /// cancellation as control flow rather than failure.
    ///
    /// [`Cancelled`]: Self::Cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool { matches!(self, SyncError::Cancelled) }
}
