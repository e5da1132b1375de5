// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures for tether-ops integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tether_core::{
    AssertionSink, ConnectionMonitor, Executor, ExecutorBuilder, MailboxReceiver, OneshotSink,
    Operation, OperationHandle, Phase, RequestId, mailbox,
};
use tether_ops::{AccountId, ImageId, InMemoryBackend, ObjectId, Services};

pub const ACCOUNT: &str = "acct-1";
pub const AVATAR: &str = "img-1";
pub const PROFILE: &str = "profile-1";

/// Backend holding one account with an avatar and a profile object.
pub fn seeded_backend() -> Arc<InMemoryBackend> {
    let backend = Arc::new(InMemoryBackend::new());
    backend.add_account(AccountId::new(ACCOUNT));
    backend.add_image(ImageId::new(AVATAR));
    backend.add_object(ObjectId::new(PROFILE), "profile");
    backend
}

pub fn services(backend: &Arc<InMemoryBackend>) -> Services {
    Services::from_backend(backend.clone())
}

pub fn online_monitor() -> Arc<ConnectionMonitor> {
    let monitor = Arc::new(ConnectionMonitor::new());
    monitor.set_online();
    monitor
}

#[derive(Default)]
pub struct RecordingAssertions {
    reports: Mutex<Vec<(String, String)>>,
}

impl RecordingAssertions {
    pub fn points(&self) -> Vec<String> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .map(|(point, _)| point.clone())
            .collect()
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

/// An executor driven by hand from the test task, so a test can act on the
/// connection between events.
pub struct Driven<O: Operation> {
    pub executor: Executor<O>,
    pub receiver: MailboxReceiver<O::Reply>,
    pub handle: Option<OperationHandle<O::Output>>,
    pub monitor: Arc<ConnectionMonitor>,
    pub assertions: Arc<RecordingAssertions>,
}

impl<O: Operation> Driven<O> {
    pub fn new(
        operation: O,
        monitor: Arc<ConnectionMonitor>,
        configure: impl FnOnce(ExecutorBuilder<O>) -> ExecutorBuilder<O>,
    ) -> Self {
        let (sink, handle) = OneshotSink::channel(RequestId(1));
        let assertions = Arc::new(RecordingAssertions::default());
        let (mailbox, receiver) = mailbox();
        let builder = Executor::builder(operation, RequestId(1), sink)
            .monitor(monitor.clone())
            .assertions(assertions.clone());
        let mut executor = configure(builder).build(mailbox);
        executor.start().expect("first start succeeds");

        Self {
            executor,
            receiver,
            handle: Some(handle),
            monitor,
            assertions,
        }
    }

    /// Wait for the next event and process it.
    pub async fn step(&mut self) {
        let event = self.receiver.recv().await.expect("mailbox open");
        self.executor.handle(event);
    }

    pub async fn run_until(&mut self, phase: Phase) {
        while self.executor.phase() != phase {
            assert!(
                !self.executor.is_stopped(),
                "stopped in {:?} waiting for {phase:?}",
                self.executor.phase()
            );
            self.step().await;
        }
    }

    pub async fn run_to_end(&mut self) {
        while !self.executor.is_stopped() {
            self.step().await;
        }
    }

    pub async fn outcome(&mut self) -> tether_core::ServiceResult<O::Output> {
        self.run_to_end().await;
        self.handle
            .take()
            .expect("outcome taken once")
            .outcome()
            .await
    }
}
