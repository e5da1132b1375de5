// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The contract a concrete operation implements.
//!
//! An operation declares an ordered list of steps. The executor calls
//! [`Operation::perform_step`] for the first step that is not done; the step
//! either finishes on the spot or issues exactly one request through
//! [`StepContext::request`] and returns. The request's reply comes back
//! through the operation's [`Mailbox`] and is handed to
//! [`Operation::on_reply`].

use std::fmt;
use std::future::Future;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::connection::{ConnectionEvent, LifecycleListener};
use crate::error::{ErrorKind, OperationError, ServiceResult};
use crate::pending::{CorrelationId, PendingRequestTable};
use crate::telemetry::AssertionSink;

/// How a step ended when `perform_step` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum StepOutcome {
    /// Completed synchronously
    Done,
    /// Not applicable to this operation instance; completed without side effects
    Skipped,
    /// One request was issued; the step completes when its reply arrives
    Requested,
}

/// A multi-step operation driven by an [`Executor`](crate::Executor).
pub trait Operation: Send + 'static {
    /// Identifier of a step, typically a fieldless enum.
    type Step: Copy + Eq + fmt::Debug + Send + 'static;
    /// Payload of a successful reply to any of this operation's requests.
    type Reply: Send + 'static;
    /// Result reported to the completion sink.
    type Output: Send + 'static;

    /// Short name used in logs and telemetry.
    fn tag(&self) -> &'static str;

    /// Steps in execution order.
    fn steps(&self) -> Vec<Self::Step>;

    /// Errors that count as "already satisfied" for specific steps.
    fn absorption(&self) -> &AbsorptionPolicy<Self::Step>;

    fn perform_step(
        &mut self,
        step: Self::Step,
        ctx: &mut StepContext<'_, Self::Step, Self::Reply>,
    ) -> ServiceResult<StepOutcome>;

    /// Fold a successful reply into the operation's results.
    /// Returning an error fails the operation.
    fn on_reply(
        &mut self,
        step: Self::Step,
        reply: Self::Reply,
        ctx: &mut ReplyContext<'_>,
    ) -> ServiceResult<()>;

    /// Called when an error was absorbed for `step`.
    fn on_absorbed(&mut self, _step: Self::Step, _error: &OperationError) {}

    /// Called before the step register is reset; accumulated results
    /// from before a disconnect must be dropped here.
    fn on_restart(&mut self) {}

    /// Build the output once every step is done. An error fails the operation.
    fn finish(&mut self) -> ServiceResult<Self::Output>;
}

/// Per-operation table of `(step, error kind)` pairs treated as success.
#[derive(Debug, Clone)]
pub struct AbsorptionPolicy<S> {
    entries: Vec<(S, ErrorKind)>,
}

impl<S: Copy + Eq> AbsorptionPolicy<S> {
    /// A policy that absorbs nothing.
    pub fn none() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Treat `kind` on `step` as the step being already satisfied.
    pub fn absorb(mut self, step: S, kind: ErrorKind) -> Self {
        // Connectivity loss is always a pause, never absorbed.
        if !kind.is_transient() && !self.absorbs(step, kind) {
            self.entries.push((step, kind));
        }
        self
    }

    pub fn absorbs(&self, step: S, kind: ErrorKind) -> bool {
        self.entries.iter().any(|&(s, k)| s == step && k == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Event delivered to an operation's mailbox.
pub enum OperationEvent<R> {
    Lifecycle(ConnectionEvent),
    Reply {
        correlation: CorrelationId,
        result: ServiceResult<R>,
    },
    DeadlineElapsed,
}

impl<R> fmt::Debug for OperationEvent<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lifecycle(event) => f.debug_tuple("Lifecycle").field(event).finish(),
            Self::Reply {
                correlation,
                result,
            } => f
                .debug_struct("Reply")
                .field("correlation", correlation)
                .field("error", &result.as_ref().err())
                .finish(),
            Self::DeadlineElapsed => f.write_str("DeadlineElapsed"),
        }
    }
}

/// Sending half of an operation's event queue.
pub struct Mailbox<R> {
    tx: mpsc::UnboundedSender<OperationEvent<R>>,
}

/// Receiving half of an operation's event queue.
pub type MailboxReceiver<R> = mpsc::UnboundedReceiver<OperationEvent<R>>;

/// Create the event queue for one operation.
pub fn mailbox<R>() -> (Mailbox<R>, MailboxReceiver<R>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Mailbox { tx }, rx)
}

impl<R> Mailbox<R> {
    /// Queue an event. Returns `false` once the operation is gone.
    pub fn send(&self, event: OperationEvent<R>) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<R> Clone for Mailbox<R> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<R> fmt::Debug for Mailbox<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<R: Send + 'static> LifecycleListener for Mailbox<R> {
    fn deliver(&self, event: ConnectionEvent) -> bool {
        self.send(OperationEvent::Lifecycle(event))
    }
}

/// One-shot completion callback for a single outstanding request.
///
/// Consuming `self` on completion makes a second delivery impossible.
pub struct Completion<T> {
    correlation: CorrelationId,
    deliver: Box<dyn FnOnce(ServiceResult<T>) + Send>,
}

impl<T: 'static> Completion<T> {
    /// Id to attach to the outgoing request.
    pub fn correlation(&self) -> CorrelationId {
        self.correlation
    }

    pub fn complete(self, result: ServiceResult<T>) {
        (self.deliver)(result)
    }

    /// Run an async backend call on the tokio runtime and complete with its result.
    ///
    /// A call that panics or is cancelled completes with an `Internal` error.
    pub fn spawn<F>(self, call: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ServiceResult<T>> + Send + 'static,
        T: Send,
    {
        tokio::spawn(async move {
            let correlation = self.correlation;
            let result = match tokio::spawn(call).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(%correlation, error = %e, "backend call did not finish");
                    Err(OperationError::internal(format!(
                        "backend call for request {correlation} did not finish: {e}"
                    )))
                }
            };
            self.complete(result);
        })
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("correlation", &self.correlation)
            .finish_non_exhaustive()
    }
}

/// What a step may do while it runs.
pub struct StepContext<'a, S, R> {
    tag: &'static str,
    step: S,
    pending: &'a mut PendingRequestTable<S>,
    mailbox: &'a Mailbox<R>,
    assertions: &'a dyn AssertionSink,
    issued: Option<CorrelationId>,
}

impl<'a, S, R> StepContext<'a, S, R>
where
    S: Copy + fmt::Debug,
    R: Send + 'static,
{
    pub(crate) fn new(
        tag: &'static str,
        step: S,
        pending: &'a mut PendingRequestTable<S>,
        mailbox: &'a Mailbox<R>,
        assertions: &'a dyn AssertionSink,
    ) -> Self {
        Self {
            tag,
            step,
            pending,
            mailbox,
            assertions,
            issued: None,
        }
    }

    pub fn step(&self) -> S {
        self.step
    }

    /// Record an outstanding request for the current step.
    ///
    /// `wrap` turns the service's result type into the operation's reply
    /// type. Only one request may be issued per step.
    pub fn request<T, F>(&mut self, wrap: F) -> ServiceResult<Completion<T>>
    where
        T: 'static,
        F: FnOnce(T) -> R + Send + 'static,
    {
        if let Some(existing) = self.issued {
            return Err(OperationError::internal(format!(
                "step {:?} already issued request {existing}",
                self.step
            )));
        }

        let correlation = self.pending.record(self.step);
        self.issued = Some(correlation);
        debug!(tag = self.tag, step = ?self.step, %correlation, "request issued");

        let mailbox = self.mailbox.clone();
        Ok(Completion {
            correlation,
            deliver: Box::new(move |result: ServiceResult<T>| {
                let delivered = mailbox.send(OperationEvent::Reply {
                    correlation,
                    result: result.map(wrap),
                });
                if !delivered {
                    debug!(%correlation, "reply for a finished operation dropped");
                }
            }),
        })
    }

    /// Report an invariant violation without stopping the operation.
    pub fn report_assertion(&self, point: &'static str, detail: impl AsRef<str>) {
        self.assertions.report(self.tag, point, detail.as_ref());
    }

    pub(crate) fn issued(&self) -> Option<CorrelationId> {
        self.issued
    }
}

/// What a reply handler may do.
pub struct ReplyContext<'a> {
    tag: &'static str,
    assertions: &'a dyn AssertionSink,
}

impl<'a> ReplyContext<'a> {
    pub(crate) fn new(tag: &'static str, assertions: &'a dyn AssertionSink) -> Self {
        Self { tag, assertions }
    }

    /// Report an invariant violation without stopping the operation.
    pub fn report_assertion(&self, point: &'static str, detail: impl AsRef<str>) {
        self.assertions.report(self.tag, point, detail.as_ref());
    }
}
