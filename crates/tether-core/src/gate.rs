// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gates decide what an operation does with each lifecycle signal.
//!
//! They wrap one another instead of forming a subclass chain:
//! [`TimedGate`] decorates [`ConnectedGate`] (or any other gate), intercepting
//! signals before forwarding them to the inner gate.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::OperationError;

/// What the executor should do in response to a lifecycle signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateAction {
    /// Nothing to do yet
    Hold,
    /// Ask the monitor for a connection and keep waiting
    Connect,
    /// Run (or resume) the step machine
    Run,
    /// Reset every step and run from the first one
    Restart,
    /// Fail the whole operation
    Fail(OperationError),
}

/// Lifecycle policy for one operation.
///
/// `paused` is true when the operation observed an offline event (or a
/// connectivity-lost reply) after it started running.
pub trait Gate: Send + fmt::Debug {
    fn on_ready(&mut self, online: bool) -> GateAction;

    fn on_online(&mut self, paused: bool) -> GateAction;

    fn on_offline(&mut self) -> GateAction {
        GateAction::Hold
    }

    /// Instant at which [`Gate::on_deadline`] should be called, if armed.
    fn deadline(&self) -> Option<Instant> {
        None
    }

    fn on_deadline(&mut self) -> GateAction {
        GateAction::Hold
    }
}

/// Base policy: run as soon as the service layer is ready.
#[derive(Debug, Default, Clone)]
pub struct Ungated;

impl Gate for Ungated {
    fn on_ready(&mut self, _online: bool) -> GateAction {
        GateAction::Run
    }

    fn on_online(&mut self, paused: bool) -> GateAction {
        if paused {
            GateAction::Restart
        } else {
            GateAction::Run
        }
    }
}

/// Holds the first step until the connection is online.
#[derive(Debug, Default, Clone)]
pub struct ConnectedGate;

impl Gate for ConnectedGate {
    fn on_ready(&mut self, online: bool) -> GateAction {
        if online {
            GateAction::Run
        } else {
            GateAction::Connect
        }
    }

    // A pause always restarts from the first step.
    fn on_online(&mut self, paused: bool) -> GateAction {
        if paused {
            GateAction::Restart
        } else {
            GateAction::Run
        }
    }
}

/// Adds a deadline that only applies while the connection was never online.
///
/// Once online has been observed the operation may be completing server-side,
/// so a later expiry is ignored rather than reported.
#[derive(Debug)]
pub struct TimedGate<G> {
    inner: G,
    deadline: Instant,
    connected: bool,
    expired: bool,
}

impl<G: Gate> TimedGate<G> {
    /// Wrap `inner`, arming the deadline `timeout` from now.
    pub fn new(inner: G, timeout: Duration) -> Self {
        Self {
            inner,
            deadline: deadline_after(timeout),
            connected: false,
            expired: false,
        }
    }

    /// Whether online was ever observed.
    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

/// Roughly 30 years; used when `now + timeout` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

impl<G: Gate> Gate for TimedGate<G> {
    fn on_ready(&mut self, online: bool) -> GateAction {
        if online {
            self.connected = true;
        }
        self.inner.on_ready(online)
    }

    fn on_online(&mut self, paused: bool) -> GateAction {
        self.connected = true;
        self.inner.on_online(paused)
    }

    // `connected` stays set across an offline period.
    fn on_offline(&mut self) -> GateAction {
        self.inner.on_offline()
    }

    fn deadline(&self) -> Option<Instant> {
        if self.expired {
            None
        } else {
            Some(self.deadline)
        }
    }

    fn on_deadline(&mut self) -> GateAction {
        if self.expired {
            return GateAction::Hold;
        }
        self.expired = true;

        if self.connected {
            debug!("deadline elapsed after reaching online, ignoring");
            GateAction::Hold
        } else {
            GateAction::Fail(OperationError::timeout(
                "connection not established before deadline",
            ))
        }
    }
}
