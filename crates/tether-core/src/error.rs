// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for tether-core.
//!
//! Two families live here:
//! - [`OperationError`] is a value carried by replies and reported to the
//!   completion sink. Its [`ErrorKind`] decides how the executor routes it.
//! - [`ExecutorError`] covers misuse of the executor API itself.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::steps::StepViolation;

/// Classification of a failed backend call or operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorKind {
    /// Connection to the backend dropped while the request was outstanding.
    /// Transient: the operation pauses and is never failed for it.
    ConnectivityLost,
    /// The operation never reached the online state before its deadline.
    Timeout,
    /// The subject of the request does not exist.
    NotFound,
    /// The backend rejected the request as malformed.
    BadRequest,
    /// The caller is not allowed to perform the request.
    Forbidden,
    /// A quota or rate limit was hit.
    LimitReached,
    /// The backend failed to process the request.
    ServiceUnavailable,
    /// An invariant inside the framework or the operation was violated.
    Internal,
}

impl ErrorKind {
    /// Returns the wire-style name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectivityLost => "connectivity_lost",
            Self::Timeout => "timeout",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::Forbidden => "forbidden",
            Self::LimitReached => "limit_reached",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Internal => "internal",
        }
    }

    /// Whether the kind is recovered locally by pausing the operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectivityLost)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by a backend reply or by an operation step.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {detail}")]
pub struct OperationError {
    /// How the executor should route the error
    pub kind: ErrorKind,
    /// Human-readable detail, propagated verbatim to the completion sink
    pub detail: String,
}

impl OperationError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn connectivity_lost(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectivityLost, detail)
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, detail)
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, detail)
    }
}

impl From<StepViolation> for OperationError {
    fn from(violation: StepViolation) -> Self {
        Self::internal(violation.to_string())
    }
}

/// Result of a backend call as seen by an operation.
pub type ServiceResult<T> = std::result::Result<T, OperationError>;

/// Errors raised by misuse of the executor API.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// `start()` was called on an executor that is already past `Created`.
    #[error("operation {tag} already started")]
    AlreadyStarted {
        /// Tag of the offending operation
        tag: &'static str,
    },

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Type alias for executor results.
pub type Result<T> = std::result::Result<T, ExecutorError>;
