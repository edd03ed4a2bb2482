// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The contract a router invokes on delivery. See [`MessageHandler`],
//! [`handler_fn`].

use std::sync::Arc;

use async_trait::async_trait;

/// An asynchronous message handler registered with a router.
///
/// Invoked with the publish key and one copy of the message. A returned error does
/// not stop delivery to other handlers; the router folds it (together with any
/// handler panic) into the publish's [`HandlerAggregateError`].
///
/// Handler *identity* is the pointer identity of its `Arc`: registering the same
/// `Arc` twice under one key is rejected, and dispatch invokes each distinct handler
/// once.
///
/// [`HandlerAggregateError`]: crate::HandlerAggregateError
#[async_trait]
pub trait MessageHandler<M: Send + 'static>: Send + Sync {
    /// Handles one delivered message.
    ///
    /// # Errors
    ///
    /// Any [`miette::Report`]; it is collected into the publish result, never raised
    /// at the publisher.
    async fn handle(&self, key: &str, message: M) -> miette::Result<()>;
}

/// Wraps a plain async closure as a [`MessageHandler`].
///
/// ```
/// use r3bl_sync::handler_fn;
///
/// let handler = handler_fn(|key: String, message: u64| async move {
///     tracing::debug!(%key, message, "received");
///     Ok(())
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<M, F, Fut>(func: F) -> Arc<dyn MessageHandler<M>>
where
    M: Send + 'static,
    F: Fn(String, M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = miette::Result<()>> + Send + 'static,
{
    Arc::new(FnMessageHandler { func })
}

struct FnMessageHandler<F> {
    func: F,
}

#[async_trait]
impl<M, F, Fut> MessageHandler<M> for FnMessageHandler<F>
where
    M: Send + 'static,
    F: Fn(String, M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = miette::Result<()>> + Send + 'static,
{
    async fn handle(&self, key: &str, message: M) -> miette::Result<()> {
        (self.func)(key.to_string(), message).await
    }
}
