// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Completion reporting.
//!
//! Every operation reports exactly one outcome to its [`CompletionSink`].
//! [`OneshotSink`] bridges that callback into an awaitable
//! [`OperationHandle`] for async callers.

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{ErrorKind, OperationError, ServiceResult};

/// Opaque id chosen by the caller to match a reported outcome to its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Receiver of the single outcome of an operation.
pub trait CompletionSink<T>: Send + Sync {
    fn report_success(&self, request_id: RequestId, payload: T);

    fn report_error(&self, request_id: RequestId, kind: ErrorKind, detail: String);
}

/// Sink that forwards the outcome into a oneshot channel.
pub struct OneshotSink<T> {
    sender: Mutex<Option<oneshot::Sender<ServiceResult<T>>>>,
}

impl<T: Send> OneshotSink<T> {
    /// Create a sink and the handle that will receive its outcome.
    pub fn channel(request_id: RequestId) -> (std::sync::Arc<Self>, OperationHandle<T>) {
        let (tx, rx) = oneshot::channel();
        let sink = std::sync::Arc::new(Self {
            sender: Mutex::new(Some(tx)),
        });
        (
            sink,
            OperationHandle {
                request_id,
                outcome: rx,
            },
        )
    }

    fn send(&self, request_id: RequestId, outcome: ServiceResult<T>) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match sender {
            Some(tx) => {
                if tx.send(outcome).is_err() {
                    debug!(%request_id, "operation handle dropped before outcome");
                }
            }
            None => debug!(%request_id, "outcome already delivered"),
        }
    }
}

impl<T: Send> CompletionSink<T> for OneshotSink<T> {
    fn report_success(&self, request_id: RequestId, payload: T) {
        self.send(request_id, Ok(payload));
    }

    fn report_error(&self, request_id: RequestId, kind: ErrorKind, detail: String) {
        self.send(request_id, Err(OperationError::new(kind, detail)));
    }
}

/// Awaitable outcome of a spawned operation.
#[derive(Debug)]
pub struct OperationHandle<T> {
    request_id: RequestId,
    outcome: oneshot::Receiver<ServiceResult<T>>,
}

impl<T> OperationHandle<T> {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Wait for the operation to report.
    ///
    /// An operation torn down without reporting resolves to an `Internal` error.
    pub async fn outcome(self) -> ServiceResult<T> {
        match self.outcome.await {
            Ok(outcome) => outcome,
            Err(_) => Err(OperationError::internal(format!(
                "{} stopped without reporting",
                self.request_id
            ))),
        }
    }
}
