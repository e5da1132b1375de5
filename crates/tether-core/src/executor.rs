// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The step machine that drives one operation.
//!
//! ```text
//! Created ──start──► Waiting ──gate: run──► Running ⇄ Suspended
//!                                              │
//!                                              ├──► Done
//!                                              ├──► Failed
//!                                              └──► Abandoned (stop() without outcome)
//! ```
//!
//! An executor is only ever touched by one task at a time; every input
//! (lifecycle signal, reply, deadline) arrives as an [`OperationEvent`] and is
//! processed to completion before the next one.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::connection::{self, ConnectionEvent, ConnectionMonitor, LifecycleListener, ListenerId};
use crate::error::{ExecutorError, OperationError, Result, ServiceResult};
use crate::gate::{ConnectedGate, Gate, GateAction, TimedGate, Ungated};
use crate::operation::{
    Mailbox, Operation, OperationEvent, ReplyContext, StepContext, StepOutcome,
};
use crate::pending::{CorrelationId, PendingRequestTable};
use crate::sink::{CompletionSink, RequestId};
use crate::steps::{StepRegister, StepStatus};
use crate::telemetry::{AssertionSink, StopEvent, Telemetry, TracingAssertions};

/// Lifecycle phase of an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Built, not registered for lifecycle signals yet
    Created,
    /// Registered; waiting for the gate to let the first step run
    Waiting,
    /// Steps are being performed or a reply is outstanding
    Running,
    /// Connectivity was lost after work began; resumes on the next online signal
    Suspended,
    /// Every step completed and success was reported
    Done,
    /// A terminal error was reported
    Failed,
    /// Stopped without reporting an outcome
    Abandoned,
}

impl Phase {
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Abandoned)
    }
}

/// Builder for [`Executor`].
pub struct ExecutorBuilder<O: Operation> {
    operation: O,
    request_id: RequestId,
    sink: Arc<dyn CompletionSink<O::Output>>,
    monitor: Option<Arc<ConnectionMonitor>>,
    gate: Option<Box<dyn Gate>>,
    telemetry: Option<Arc<dyn Telemetry>>,
    assertions: Option<Arc<dyn AssertionSink>>,
}

impl<O: Operation> ExecutorBuilder<O> {
    /// Monitor to register with (default: the process-wide monitor).
    pub fn monitor(mut self, monitor: Arc<ConnectionMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Lifecycle policy (default: [`Ungated`]).
    pub fn gate(mut self, gate: impl Gate + 'static) -> Self {
        self.gate = Some(Box::new(gate));
        self
    }

    /// Hold the first step until the connection is online.
    pub fn connected(self) -> Self {
        self.gate(ConnectedGate)
    }

    /// Like [`connected`](Self::connected), failing with a timeout if online
    /// is not reached within `timeout`. The deadline is armed now.
    pub fn timed(self, timeout: Duration) -> Self {
        self.gate(TimedGate::new(ConnectedGate, timeout))
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn assertions(mut self, assertions: Arc<dyn AssertionSink>) -> Self {
        self.assertions = Some(assertions);
        self
    }

    /// Finish building. `mailbox` is the queue this executor's events arrive on.
    pub fn build(self, mailbox: Mailbox<O::Reply>) -> Executor<O> {
        let register = StepRegister::new(self.operation.steps());
        Executor {
            operation: self.operation,
            request_id: self.request_id,
            register,
            pending: PendingRequestTable::new(),
            gate: self.gate.unwrap_or_else(|| Box::new(Ungated)),
            phase: Phase::Created,
            monitor: self
                .monitor
                .unwrap_or_else(|| connection::global().clone()),
            listener: None,
            mailbox,
            sink: self.sink,
            telemetry: self.telemetry,
            assertions: self
                .assertions
                .unwrap_or_else(|| Arc::new(TracingAssertions)),
            created_at: Instant::now(),
        }
    }
}

/// Drives one [`Operation`] through its steps.
pub struct Executor<O: Operation> {
    operation: O,
    request_id: RequestId,
    register: StepRegister<O::Step>,
    pending: PendingRequestTable<O::Step>,
    gate: Box<dyn Gate>,
    phase: Phase,
    monitor: Arc<ConnectionMonitor>,
    listener: Option<ListenerId>,
    mailbox: Mailbox<O::Reply>,
    sink: Arc<dyn CompletionSink<O::Output>>,
    telemetry: Option<Arc<dyn Telemetry>>,
    assertions: Arc<dyn AssertionSink>,
    created_at: Instant,
}

impl<O: Operation> Executor<O> {
    pub fn builder(
        operation: O,
        request_id: RequestId,
        sink: Arc<dyn CompletionSink<O::Output>>,
    ) -> ExecutorBuilder<O> {
        ExecutorBuilder {
            operation,
            request_id,
            sink,
            monitor: None,
            gate: None,
            telemetry: None,
            assertions: None,
        }
    }

    pub fn tag(&self) -> &'static str {
        self.operation.tag()
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_stopped(&self) -> bool {
        self.phase.is_stopped()
    }

    pub fn register(&self) -> &StepRegister<O::Step> {
        &self.register
    }

    pub fn pending(&self) -> &PendingRequestTable<O::Step> {
        &self.pending
    }

    pub fn operation(&self) -> &O {
        &self.operation
    }

    /// When the next `DeadlineElapsed` event is due, if a deadline is armed.
    pub fn deadline(&self) -> Option<Instant> {
        if self.phase.is_stopped() {
            None
        } else {
            self.gate.deadline()
        }
    }

    /// Register for lifecycle signals. May only be called once.
    pub fn start(&mut self) -> Result<()> {
        if self.phase != Phase::Created {
            return Err(ExecutorError::AlreadyStarted { tag: self.tag() });
        }

        self.phase = Phase::Waiting;
        let listener: Arc<dyn LifecycleListener> = Arc::new(self.mailbox.clone());
        self.listener = Some(self.monitor.register(listener));
        debug!(tag = self.tag(), request_id = %self.request_id, "operation started");
        Ok(())
    }

    /// Process one event to completion.
    pub fn handle(&mut self, event: OperationEvent<O::Reply>) {
        if self.phase.is_stopped() {
            debug!(tag = self.tag(), ?event, "event after stop ignored");
            return;
        }

        match event {
            OperationEvent::Lifecycle(event) => self.on_lifecycle(event),
            OperationEvent::Reply {
                correlation,
                result,
            } => self.on_reply(correlation, result),
            OperationEvent::DeadlineElapsed => {
                let action = self.gate.on_deadline();
                self.apply(action);
            }
        }
    }

    /// Tear the operation down. Idempotent; does not report an outcome.
    pub fn stop(&mut self) {
        self.stop_with(Phase::Abandoned);
    }

    fn on_lifecycle(&mut self, event: ConnectionEvent) {
        let action = match event {
            ConnectionEvent::Ready => {
                if self.phase != Phase::Waiting {
                    return;
                }
                let online = self.monitor.is_online();
                self.gate.on_ready(online)
            }
            ConnectionEvent::Online => {
                if self.phase == Phase::Created {
                    return;
                }
                let paused = self.phase == Phase::Suspended;
                self.gate.on_online(paused)
            }
            ConnectionEvent::Offline => {
                let action = self.gate.on_offline();
                self.suspend("connection offline");
                action
            }
        };
        self.apply(action);
    }

    fn on_reply(&mut self, correlation: CorrelationId, result: ServiceResult<O::Reply>) {
        let tag = self.tag();
        let Some(step) = self.pending.resolve(correlation) else {
            debug!(tag, %correlation, "reply matches no pending request, ignoring");
            return;
        };

        match result {
            Ok(reply) => {
                let mut ctx = ReplyContext::new(tag, &*self.assertions);
                match self.operation.on_reply(step, reply, &mut ctx) {
                    Ok(()) => self.complete_step(step),
                    Err(error) => self.fail(error),
                }
            }
            Err(error) if error.kind.is_transient() => {
                debug!(tag, ?step, %correlation, detail = %error.detail, "request lost with the connection");
                self.suspend("connectivity lost during step");
            }
            Err(error) if self.operation.absorption().absorbs(step, error.kind) => {
                info!(tag, ?step, kind = %error.kind, "error absorbed, step treated as done");
                self.operation.on_absorbed(step, &error);
                self.complete_step(step);
            }
            Err(error) => self.fail(error),
        }
    }

    fn apply(&mut self, action: GateAction) {
        match action {
            GateAction::Hold => {}
            GateAction::Connect => {
                info!(tag = self.tag(), "waiting for connection");
                self.monitor.request_connect();
            }
            GateAction::Run => {
                if matches!(
                    self.phase,
                    Phase::Waiting | Phase::Running | Phase::Suspended
                ) {
                    self.phase = Phase::Running;
                    self.advance();
                }
            }
            GateAction::Restart => {
                if matches!(
                    self.phase,
                    Phase::Waiting | Phase::Running | Phase::Suspended
                ) {
                    self.restart();
                }
            }
            GateAction::Fail(error) => self.fail(error),
        }
    }

    fn suspend(&mut self, reason: &'static str) {
        if self.phase == Phase::Running {
            info!(tag = self.tag(), reason, "operation paused");
            self.phase = Phase::Suspended;
        }
    }

    fn restart(&mut self) {
        let abandoned = self.pending.abandon_all();
        info!(
            tag = self.tag(),
            done = self.register.done_count(),
            abandoned,
            "restarting from the first step"
        );
        self.register.reset();
        self.operation.on_restart();
        self.phase = Phase::Running;
        self.advance();
    }

    fn complete_step(&mut self, step: O::Step) {
        if let Err(violation) = self.register.complete(step) {
            self.fail(violation.into());
            return;
        }
        debug!(tag = self.tag(), ?step, "step done");

        if self.phase == Phase::Running {
            self.advance();
        }
    }

    /// Run steps until one is waiting on a reply, the operation stops, or
    /// every step is done.
    fn advance(&mut self) {
        let tag = self.tag();
        while self.phase == Phase::Running {
            let Some((step, status)) = self.register.next() else {
                self.finish();
                return;
            };
            if status == StepStatus::InFlight {
                return;
            }
            if let Err(violation) = self.register.start(step) {
                self.fail(violation.into());
                return;
            }

            let mut ctx = StepContext::new(
                tag,
                step,
                &mut self.pending,
                &self.mailbox,
                &*self.assertions,
            );
            let outcome = self.operation.perform_step(step, &mut ctx);
            let issued = ctx.issued();

            match (outcome, issued) {
                (Ok(StepOutcome::Done), None) | (Ok(StepOutcome::Skipped), None) => {
                    if let Err(violation) = self.register.complete(step) {
                        self.fail(violation.into());
                        return;
                    }
                    debug!(tag, ?step, "step done synchronously");
                }
                (Ok(StepOutcome::Requested), Some(correlation)) => {
                    debug!(tag, ?step, %correlation, "waiting for reply");
                    return;
                }
                (Ok(outcome), issued) => {
                    self.fail(OperationError::internal(format!(
                        "step {step:?} returned {outcome:?} with request {issued:?}"
                    )));
                    return;
                }
                (Err(error), _) => {
                    self.fail(error);
                    return;
                }
            }
        }
    }

    fn finish(&mut self) {
        let output = match self.operation.finish() {
            Ok(output) => output,
            Err(error) => {
                self.fail(error);
                return;
            }
        };
        if self.stop_with(Phase::Done) {
            info!(tag = self.tag(), request_id = %self.request_id, "operation completed");
            self.sink.report_success(self.request_id, output);
        }
    }

    fn fail(&mut self, error: OperationError) {
        if self.stop_with(Phase::Failed) {
            warn!(
                tag = self.tag(),
                request_id = %self.request_id,
                kind = %error.kind,
                detail = %error.detail,
                "operation failed"
            );
            self.sink
                .report_error(self.request_id, error.kind, error.detail);
        }
    }

    /// Enter a terminal phase. Returns `false` if already stopped.
    fn stop_with(&mut self, phase: Phase) -> bool {
        if self.phase.is_stopped() {
            return false;
        }
        self.phase = phase;

        if let Some(listener) = self.listener.take() {
            self.monitor.unregister(listener);
        }
        let abandoned = self.pending.abandon_all();
        debug!(tag = self.tag(), ?phase, abandoned, "operation stopped");

        if let Some(telemetry) = &self.telemetry {
            let elapsed = self.created_at.elapsed();
            telemetry.record(&StopEvent {
                tag: self.operation.tag().to_string(),
                request_id: self.request_id,
                outcome: phase,
                elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                stopped_at: Utc::now(),
            });
        }
        true
    }
}

impl<O: Operation> Drop for Executor<O> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.monitor.unregister(listener);
        }
    }
}

impl<O: Operation> std::fmt::Debug for Executor<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("tag", &self.tag())
            .field("request_id", &self.request_id)
            .field("phase", &self.phase)
            .field("gate", &self.gate)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}
