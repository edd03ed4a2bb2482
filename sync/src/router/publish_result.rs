// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The result object of a publish. See [`PublishResult`],
//! [`HandlerAggregateError`].

use std::fmt;

/// Outcome of one `publish_message` call.
///
/// `receiver_count` is the number of subscriptions in the snapshot the publish read -
/// counted *before* de-duplication by handler identity, so it reflects what was
/// registered at publish time. Handler failures never raise at the publisher; they
/// arrive aggregated in `error`.
#[derive(Debug)]
#[must_use]
pub struct PublishResult {
    /// Subscriptions that were addressed by this publish.
    pub receiver_count: usize,
    /// Aggregated handler failures, or [`None`] when every handler succeeded.
    pub error: Option<HandlerAggregateError>,
}

impl PublishResult {
    /// `true` when every invoked handler completed without error or panic.
    #[must_use]
    pub fn is_ok(&self) -> bool { self.error.is_none() }
}

/// One failed handler invocation inside a publish.
#[derive(Debug)]
pub enum HandlerFailure {
    /// The handler returned an error report.
    Returned(miette::Report),
    /// The handler task panicked; the panic was isolated to that task.
    Panicked(tokio::task::JoinError),
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerFailure::Returned(report) => {
                write!(f, "handler returned an error: {report}")
            }
            HandlerFailure::Panicked(join_error) => {
                write!(f, "handler panicked: {join_error}")
            }
        }
    }
}

/// Aggregate of every handler failure from one publish. Carried inside
/// [`PublishResult::error`]; one failing handler never prevents invocation of the
/// rest, so the aggregate can hold several entries.
///
/// Implemented by hand rather than derived: [`miette::Report`] is an erased report
/// type, not a [`std::error::Error`], so the failures are exposed as a slice instead
/// of `source()` chaining.
#[derive(Debug)]
pub struct HandlerAggregateError {
    failures: Vec<HandlerFailure>,
}

impl HandlerAggregateError {
    /// Wraps the collected failures, or [`None`] when there are none (so the caller
    /// can assign the result straight into [`PublishResult::error`]).
    pub(crate) fn from_failures(failures: Vec<HandlerFailure>) -> Option<Self> {
        if failures.is_empty() {
            None
        } else {
            Some(Self { failures })
        }
    }

    /// How many handler invocations failed.
    #[must_use]
    pub fn failure_count(&self) -> usize { self.failures.len() }

    /// The individual failures, in handler-completion order.
    #[must_use]
    pub fn failures(&self) -> &[HandlerFailure] { &self.failures }

    /// Consumes the aggregate, yielding the individual failures.
    #[must_use]
    pub fn into_failures(self) -> Vec<HandlerFailure> { self.failures }
}

impl fmt::Display for HandlerAggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} handler(s) failed during publish", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for HandlerAggregateError {}
