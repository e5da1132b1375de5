// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tether Core - step-machine executor for multi-step operations against an
//! intermittently connected backend.
//!
//! An operation is an ordered list of steps. Each step either completes on
//! the spot or issues exactly one request and waits for its reply, which is
//! matched back to the step through a correlation id. The executor reacts to
//! connection lifecycle signals, pauses when connectivity drops, restarts
//! from the first step after a reconnect, and reports exactly one outcome.
//!
//! # Components
//!
//! - [`PendingRequestTable`]: correlation id → step
//! - [`StepRegister`]: ordered steps with `Pending / InFlight / Done` status
//! - [`ConnectionMonitor`]: process-wide connection state, pushes
//!   [`ConnectionEvent`]s to registered operations
//! - [`Gate`]: lifecycle policy; [`ConnectedGate`] and [`TimedGate`] decorate
//!   the base [`Ungated`] behavior
//! - [`Executor`]: the state machine for one [`Operation`]
//! - [`OperationRuntime`]: spawns one tokio task per operation
//!
//! # Quick Start
//!
//! ```ignore
//! use tether_core::{ExecutionMode, ExecutorConfig, OperationRuntime};
//!
//! let runtime = OperationRuntime::from_env()?;
//! let handle = runtime.spawn(my_operation, ExecutionMode::Timed(None));
//!
//! // Elsewhere, the connection task drives the monitor
//! runtime.monitor().set_ready();
//! runtime.monitor().set_online();
//!
//! let output = handle.outcome().await?;
//! ```
//!
//! # Configuration
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TETHER_OPERATION_TIMEOUT_MS` | `30000` | Deadline for timed operations |
//! | `TETHER_TELEMETRY` | `true` | Emit a stop event per operation |

pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod gate;
pub mod operation;
pub mod pending;
pub mod runtime;
pub mod sink;
pub mod steps;
pub mod telemetry;

pub use config::{ConfigError, ExecutorConfig};
pub use connection::{
    ConnectionEvent, ConnectionMonitor, ConnectionState, LifecycleListener, ListenerId,
};
pub use error::{ErrorKind, ExecutorError, OperationError, Result, ServiceResult};
pub use executor::{Executor, ExecutorBuilder, Phase};
pub use gate::{ConnectedGate, Gate, GateAction, TimedGate, Ungated};
pub use operation::{
    AbsorptionPolicy, Completion, Mailbox, MailboxReceiver, Operation, OperationEvent,
    ReplyContext, StepContext, StepOutcome, mailbox,
};
pub use pending::{CorrelationId, PendingRequestTable};
pub use runtime::{ExecutionMode, OperationRuntime, drive};
pub use sink::{CompletionSink, OneshotSink, OperationHandle, RequestId};
pub use steps::{StepRegister, StepStatus, StepViolation};
pub use telemetry::{AssertionSink, StopEvent, Telemetry, TracingAssertions, TracingTelemetry};
