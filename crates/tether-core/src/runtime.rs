// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Async driver: one tokio task per operation.
//!
//! The task owns the executor and its mailbox, so every lifecycle signal,
//! reply and deadline for that operation is processed strictly one at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::config::ExecutorConfig;
use crate::connection::{self, ConnectionMonitor};
use crate::error::Result;
use crate::executor::Executor;
use crate::operation::{MailboxReceiver, Operation, OperationEvent, mailbox};
use crate::sink::{CompletionSink, OneshotSink, OperationHandle, RequestId};
use crate::telemetry::{AssertionSink, Telemetry, TracingAssertions, TracingTelemetry};

/// How an operation waits for connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Run as soon as the service layer is ready
    Immediate,
    /// Wait for online before the first step
    Connected,
    /// Wait for online, failing with a timeout if it is not reached in time.
    /// `None` uses the configured default.
    Timed(Option<Duration>),
}

/// Spawns operations onto the tokio runtime.
pub struct OperationRuntime {
    config: ExecutorConfig,
    monitor: Arc<ConnectionMonitor>,
    telemetry: Arc<dyn Telemetry>,
    assertions: Arc<dyn AssertionSink>,
    next_request: AtomicU64,
}

impl OperationRuntime {
    pub fn new(config: ExecutorConfig, monitor: Arc<ConnectionMonitor>) -> Self {
        Self {
            config,
            monitor,
            telemetry: Arc::new(TracingTelemetry),
            assertions: Arc::new(TracingAssertions),
            next_request: AtomicU64::new(1),
        }
    }

    /// Runtime configured from the environment, bound to the process-wide monitor.
    ///
    /// See [`ExecutorConfig::from_env`] for the variables read.
    pub fn from_env() -> Result<Self> {
        let config = ExecutorConfig::from_env()?;
        Ok(Self::new(config, connection::global().clone()))
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_assertions(mut self, assertions: Arc<dyn AssertionSink>) -> Self {
        self.assertions = assertions;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn monitor(&self) -> &Arc<ConnectionMonitor> {
        &self.monitor
    }

    /// Spawn an operation and return a handle to await its outcome.
    pub fn spawn<O: Operation>(
        &self,
        operation: O,
        mode: ExecutionMode,
    ) -> OperationHandle<O::Output> {
        let request_id = RequestId(self.next_request.fetch_add(1, Ordering::Relaxed));
        let (sink, handle) = OneshotSink::channel(request_id);
        self.submit(operation, mode, request_id, sink);
        handle
    }

    /// Spawn an operation reporting to a caller-supplied sink.
    pub fn submit<O: Operation>(
        &self,
        operation: O,
        mode: ExecutionMode,
        request_id: RequestId,
        sink: Arc<dyn CompletionSink<O::Output>>,
    ) -> JoinHandle<()> {
        let (mailbox, receiver) = mailbox();
        let mut builder = Executor::builder(operation, request_id, sink)
            .monitor(self.monitor.clone())
            .assertions(self.assertions.clone());
        if self.config.telemetry_enabled {
            builder = builder.telemetry(self.telemetry.clone());
        }
        builder = match mode {
            ExecutionMode::Immediate => builder,
            ExecutionMode::Connected => builder.connected(),
            ExecutionMode::Timed(timeout) => {
                builder.timed(timeout.unwrap_or_else(|| self.config.operation_timeout()))
            }
        };

        tokio::spawn(drive(builder.build(mailbox), receiver))
    }
}

/// Run an executor until it stops.
#[instrument(skip_all, fields(tag = executor.tag(), request_id = %executor.request_id()))]
pub async fn drive<O: Operation>(
    mut executor: Executor<O>,
    mut receiver: MailboxReceiver<O::Reply>,
) {
    if let Err(e) = executor.start() {
        warn!(error = %e, "operation could not start");
        return;
    }

    while !executor.is_stopped() {
        let deadline = executor.deadline();
        tokio::select! {
            biased;

            event = receiver.recv() => match event {
                Some(event) => executor.handle(event),
                None => {
                    debug!("mailbox closed");
                    break;
                }
            },

            _ = sleep_until(deadline) => {
                executor.handle(OperationEvent::DeadlineElapsed);
            }
        }
    }

    executor.stop();
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
