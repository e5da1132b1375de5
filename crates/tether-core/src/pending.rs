// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Correlation of outstanding requests to the steps that issued them.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Process-wide source of correlation ids. Never reset, so ids are never reused.
static NEXT_CORRELATION: AtomicU64 = AtomicU64::new(1);

/// Id attached to an outgoing request so its reply can be matched to a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// Allocate the next id from the process-wide counter.
    pub fn next() -> Self {
        Self(NEXT_CORRELATION.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Single-owner table of outstanding requests for one operation.
///
/// Not synchronized: the executor owning it is only ever driven from one task.
#[derive(Debug)]
pub struct PendingRequestTable<S> {
    entries: HashMap<CorrelationId, S>,
}

impl<S: Copy> PendingRequestTable<S> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Allocate a fresh correlation id for `step` and remember the pairing.
    pub fn record(&mut self, step: S) -> CorrelationId {
        let id = CorrelationId::next();
        self.entries.insert(id, step);
        id
    }

    /// Remove and return the step paired with `id`.
    ///
    /// `None` means the reply belongs to nobody alive here (already resolved,
    /// abandoned, or issued by another operation) and must be ignored.
    pub fn resolve(&mut self, id: CorrelationId) -> Option<S> {
        self.entries.remove(&id)
    }

    pub fn contains(&self, id: CorrelationId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every outstanding request. Replies that arrive later resolve to `None`.
    pub fn abandon_all(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }
}

impl<S: Copy> Default for PendingRequestTable<S> {
    fn default() -> Self {
        Self::new()
    }
}
