// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Passive observability hooks: stop events and the assertion channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::executor::Phase;
use crate::sink::RequestId;

/// Emitted once when an operation stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopEvent {
    /// Operation tag
    pub tag: String,
    pub request_id: RequestId,
    /// Terminal phase reached
    pub outcome: Phase,
    /// Time from construction to stop
    pub elapsed_ms: u64,
    pub stopped_at: DateTime<Utc>,
}

/// Receiver of stop events.
pub trait Telemetry: Send + Sync {
    fn record(&self, event: &StopEvent);
}

/// Logs stop events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn record(&self, event: &StopEvent) {
        info!(
            tag = %event.tag,
            request_id = %event.request_id,
            outcome = ?event.outcome,
            elapsed_ms = event.elapsed_ms,
            "operation stopped"
        );
    }
}

/// Channel for invariant violations that do not by themselves stop an operation.
pub trait AssertionSink: Send + Sync {
    fn report(&self, tag: &'static str, point: &'static str, detail: &str);
}

/// Logs assertion reports at error level on the `tether::assertion` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAssertions;

impl AssertionSink for TracingAssertions {
    fn report(&self, tag: &'static str, point: &'static str, detail: &str) {
        error!(target: "tether::assertion", tag, point, detail, "assertion failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_event_serializes() {
        let event = StopEvent {
            tag: "delete-account".to_string(),
            request_id: RequestId(4),
            outcome: Phase::Done,
            elapsed_ms: 12,
            stopped_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["tag"], "delete-account");
        assert_eq!(value["request_id"], 4);
        assert_eq!(value["outcome"], "done");
        assert_eq!(value["elapsed_ms"], 12);

        let back: StopEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}
