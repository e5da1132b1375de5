// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures for tether-core integration tests.
//!
//! `Pipeline` is a scriptable operation; `Harness` plays the role of the
//! serialized worker by pumping the executor's mailbox by hand.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tether_core::{
    AbsorptionPolicy, AssertionSink, Completion, CompletionSink, ConnectionMonitor, CorrelationId, ErrorKind,
    Executor, ExecutorBuilder, MailboxReceiver, Operation, OperationError, ReplyContext,
    RequestId, ServiceResult, StepContext, StepOutcome, StopEvent, Telemetry, mailbox,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Prepare,
    Fetch,
    Store,
}

/// What a step does when performed.
#[derive(Debug, Clone)]
pub enum Action {
    /// Complete synchronously
    Sync,
    /// Not applicable; skip
    Skip,
    /// Issue one request; the test completes it through the probe
    Request,
    /// Issue one request completed by a spawned task with this value
    Spawn(u32),
    /// Issue one request whose spawned backend call panics
    SpawnPanic,
    /// Fail the step with this error
    Fail(OperationError),
    /// Return `Requested` without issuing anything
    ClaimRequested,
    /// Try to issue two requests
    DoubleRequest,
}

/// Observation points shared between a test and its `Pipeline`.
#[derive(Clone, Default)]
pub struct Probe {
    performed: Arc<Mutex<Vec<Step>>>,
    completions: Arc<Mutex<VecDeque<Completion<u32>>>>,
    restarts: Arc<Mutex<u32>>,
}

impl Probe {
    pub fn performed(&self) -> Vec<Step> {
        self.performed.lock().unwrap().clone()
    }

    pub fn restarts(&self) -> u32 {
        *self.restarts.lock().unwrap()
    }

    pub fn outstanding(&self) -> usize {
        self.completions.lock().unwrap().len()
    }

    /// Correlation of the most recent request still held by the probe.
    pub fn latest_correlation(&self) -> Option<CorrelationId> {
        self.completions
            .lock()
            .unwrap()
            .back()
            .map(|completion| completion.correlation())
    }

    /// Oldest completion not yet handed out.
    pub fn take_completion(&self) -> Completion<u32> {
        self.completions
            .lock()
            .unwrap()
            .pop_front()
            .expect("no outstanding completion")
    }
}

async fn panicking_call() -> ServiceResult<u32> {
    panic!("backend call panicked")
}

pub struct Pipeline {
    plan: Vec<(Step, Action)>,
    policy: AbsorptionPolicy<Step>,
    probe: Probe,
    collected: Vec<u32>,
}

impl Pipeline {
    pub fn new(plan: Vec<(Step, Action)>, probe: Probe) -> Self {
        Self {
            plan,
            policy: AbsorptionPolicy::none(),
            probe,
            collected: Vec::new(),
        }
    }

    /// `Prepare` runs synchronously, `Fetch` issues one request.
    pub fn two_step(probe: Probe) -> Self {
        Self::new(
            vec![(Step::Prepare, Action::Sync), (Step::Fetch, Action::Request)],
            probe,
        )
    }

    pub fn absorbing(mut self, step: Step, kind: ErrorKind) -> Self {
        self.policy = self.policy.absorb(step, kind);
        self
    }
}

impl Operation for Pipeline {
    type Step = Step;
    type Reply = u32;
    type Output = Vec<u32>;

    fn tag(&self) -> &'static str {
        "pipeline"
    }

    fn steps(&self) -> Vec<Step> {
        self.plan.iter().map(|(step, _)| *step).collect()
    }

    fn absorption(&self) -> &AbsorptionPolicy<Step> {
        &self.policy
    }

    fn perform_step(
        &mut self,
        step: Step,
        ctx: &mut StepContext<'_, Step, u32>,
    ) -> ServiceResult<StepOutcome> {
        self.probe.performed.lock().unwrap().push(step);
        let action = self
            .plan
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, action)| action.clone())
            .expect("step in plan");

        match action {
            Action::Sync => Ok(StepOutcome::Done),
            Action::Skip => Ok(StepOutcome::Skipped),
            Action::Request => {
                let completion = ctx.request(|value: u32| value)?;
                self.probe.completions.lock().unwrap().push_back(completion);
                Ok(StepOutcome::Requested)
            }
            Action::Spawn(value) => {
                let completion = ctx.request(|value: u32| value)?;
                completion.spawn(async move { Ok(value) });
                Ok(StepOutcome::Requested)
            }
            Action::SpawnPanic => {
                let completion = ctx.request(|value: u32| value)?;
                completion.spawn(panicking_call());
                Ok(StepOutcome::Requested)
            }
            Action::Fail(error) => Err(error),
            Action::ClaimRequested => Ok(StepOutcome::Requested),
            Action::DoubleRequest => {
                let first = ctx.request(|value: u32| value)?;
                self.probe.completions.lock().unwrap().push_back(first);
                let second = ctx.request(|value: u32| value)?;
                self.probe.completions.lock().unwrap().push_back(second);
                Ok(StepOutcome::Requested)
            }
        }
    }

    fn on_reply(&mut self, step: Step, reply: u32, ctx: &mut ReplyContext<'_>) -> ServiceResult<()> {
        if reply == 0 {
            ctx.report_assertion("non_zero_reply", format!("{step:?} replied 0"));
        }
        self.collected.push(reply);
        Ok(())
    }

    fn on_restart(&mut self) {
        *self.probe.restarts.lock().unwrap() += 1;
        self.collected.clear();
    }

    fn finish(&mut self) -> ServiceResult<Vec<u32>> {
        Ok(std::mem::take(&mut self.collected))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report<T> {
    Success(RequestId, T),
    Error(RequestId, ErrorKind, String),
}

pub struct RecordingSink<T> {
    reports: Mutex<Vec<Report<T>>>,
}

impl<T: Clone> RecordingSink<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            reports: Mutex::new(Vec::new()),
        })
    }

    pub fn reports(&self) -> Vec<Report<T>> {
        self.reports.lock().unwrap().clone()
    }
}

impl<T: Send> CompletionSink<T> for RecordingSink<T> {
    fn report_success(&self, request_id: RequestId, payload: T) {
        self.reports
            .lock()
            .unwrap()
            .push(Report::Success(request_id, payload));
    }

    fn report_error(&self, request_id: RequestId, kind: ErrorKind, detail: String) {
        self.reports
            .lock()
            .unwrap()
            .push(Report::Error(request_id, kind, detail));
    }
}

#[derive(Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<StopEvent>>,
}

impl RecordingTelemetry {
    pub fn events(&self) -> Vec<StopEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Telemetry for RecordingTelemetry {
    fn record(&self, event: &StopEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[derive(Default)]
pub struct RecordingAssertions {
    reports: Mutex<Vec<(String, String)>>,
}

impl RecordingAssertions {
    pub fn reports(&self) -> Vec<(String, String)> {
        self.reports.lock().unwrap().clone()
    }
}

impl AssertionSink for RecordingAssertions {
    fn report(&self, _tag: &'static str, point: &'static str, detail: &str) {
        self.reports
            .lock()
            .unwrap()
            .push((point.to_string(), detail.to_string()));
    }
}

pub const REQUEST: RequestId = RequestId(99);

/// Executor plus everything a test needs to observe it.
pub struct Harness<O: Operation> {
    pub executor: Executor<O>,
    pub receiver: MailboxReceiver<O::Reply>,
    pub monitor: Arc<ConnectionMonitor>,
    pub sink: Arc<RecordingSink<O::Output>>,
    pub telemetry: Arc<RecordingTelemetry>,
    pub assertions: Arc<RecordingAssertions>,
}

impl<O> Harness<O>
where
    O: Operation,
    O::Output: Clone,
{
    pub fn new(
        operation: O,
        monitor: Arc<ConnectionMonitor>,
        configure: impl FnOnce(ExecutorBuilder<O>) -> ExecutorBuilder<O>,
    ) -> Self {
        let sink = RecordingSink::new();
        let telemetry = Arc::new(RecordingTelemetry::default());
        let assertions = Arc::new(RecordingAssertions::default());
        let (mailbox, receiver) = mailbox();

        let builder = Executor::builder(operation, REQUEST, sink.clone())
            .monitor(monitor.clone())
            .telemetry(telemetry.clone())
            .assertions(assertions.clone());
        let executor = configure(builder).build(mailbox);

        Self {
            executor,
            receiver,
            monitor,
            sink,
            telemetry,
            assertions,
        }
    }

    /// Start the executor and process everything queued.
    pub fn start(&mut self) {
        self.executor.start().expect("first start succeeds");
        self.pump();
    }

    /// Process queued events until the mailbox is empty.
    pub fn pump(&mut self) {
        while let Ok(event) = self.receiver.try_recv() {
            self.executor.handle(event);
        }
    }

    pub fn reports(&self) -> Vec<Report<O::Output>> {
        self.sink.reports()
    }
}

pub fn online_monitor() -> Arc<ConnectionMonitor> {
    let monitor = Arc::new(ConnectionMonitor::new());
    monitor.set_online();
    monitor
}

pub fn offline_monitor() -> Arc<ConnectionMonitor> {
    let monitor = Arc::new(ConnectionMonitor::new());
    monitor.set_ready();
    monitor
}
