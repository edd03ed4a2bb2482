// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Shared dispatch path for both router flavors.

use std::sync::Arc;

use futures_util::future::join_all;

use crate::{HandlerAggregateError, HandlerFailure, MessageHandler, PublishResult,
            Subscription};

/// Dispatches one message to every *distinct* handler in the snapshot, one spawned
/// task per handler, and folds failures (error returns and panics alike) into the
/// aggregate. The spawn-per-handler shape is what isolates a panicking handler from
/// its siblings: the panic surfaces as that task's `JoinError` while the other tasks
/// run to completion.
pub(crate) async fn dispatch_to_snapshot<M: Clone + Send + 'static>(
    subscriptions: &[Subscription<M>],
    key: &str,
    message: M,
) -> PublishResult {
    let receiver_count = subscriptions.len();

    // De-duplicate by handler identity; each distinct handler gets one invocation.
    let mut distinct: Vec<Arc<dyn MessageHandler<M>>> =
        Vec::with_capacity(receiver_count);
    for subscription in subscriptions {
        if !distinct
            .iter()
            .any(|seen| Arc::ptr_eq(seen, &subscription.handler))
        {
            distinct.push(Arc::clone(&subscription.handler));
        }
    }

    let tasks: Vec<_> = distinct
        .into_iter()
        .map(|handler| {
            let key = key.to_string();
            let message = message.clone();
            tokio::spawn(async move { handler.handle(&key, message).await })
        })
        .collect();

    let mut failures = Vec::new();
    for outcome in join_all(tasks).await {
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(report)) => {
                tracing::warn!(%report, "router handler returned an error");
                failures.push(HandlerFailure::Returned(report));
            }
            Err(join_error) => {
                tracing::warn!(%join_error, "router handler panicked");
                failures.push(HandlerFailure::Panicked(join_error));
            }
        }
    }

    PublishResult {
        receiver_count,
        error: HandlerAggregateError::from_failures(failures),
    }
}
