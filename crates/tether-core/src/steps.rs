// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ordered step register.
//!
//! Each step moves `Pending -> InFlight -> Done`. A step can only start when
//! every step before it is done, so ordering is enforced by the register
//! rather than by each operation. Steps go back to `Pending` only through
//! [`StepRegister::reset`], which resets the whole operation.

use std::fmt;

use thiserror::Error;

/// Progress of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Not started yet
    Pending,
    /// Started; waiting for its request to be answered
    InFlight,
    /// Completed (or skipped, or absorbed)
    Done,
}

/// A transition the register refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepViolation {
    #[error("unknown step {step}")]
    Unknown { step: String },

    #[error("step {step} cannot start while {status:?}")]
    NotPending { step: String, status: StepStatus },

    #[error("step {step} cannot start before {blocking} is done")]
    OutOfOrder { step: String, blocking: String },

    #[error("step {step} cannot complete while {status:?}")]
    NotInFlight { step: String, status: StepStatus },
}

/// The ordered list of steps of one operation and their status.
#[derive(Debug, Clone)]
pub struct StepRegister<S> {
    steps: Vec<(S, StepStatus)>,
}

impl<S: Copy + Eq + fmt::Debug> StepRegister<S> {
    /// Build a register in the given order, every step `Pending`.
    pub fn new(steps: impl IntoIterator<Item = S>) -> Self {
        Self {
            steps: steps
                .into_iter()
                .map(|step| (step, StepStatus::Pending))
                .collect(),
        }
    }

    /// First step that is not done, with its status.
    pub fn next(&self) -> Option<(S, StepStatus)> {
        self.steps
            .iter()
            .copied()
            .find(|(_, status)| *status != StepStatus::Done)
    }

    pub fn status(&self, step: S) -> Option<StepStatus> {
        self.position(step).map(|idx| self.steps[idx].1)
    }

    /// Mark `step` as started.
    pub fn start(&mut self, step: S) -> Result<(), StepViolation> {
        let idx = self.position(step).ok_or_else(|| StepViolation::Unknown {
            step: format!("{step:?}"),
        })?;

        if let Some((blocking, _)) = self.steps[..idx]
            .iter()
            .find(|(_, status)| *status != StepStatus::Done)
        {
            return Err(StepViolation::OutOfOrder {
                step: format!("{step:?}"),
                blocking: format!("{blocking:?}"),
            });
        }

        match self.steps[idx].1 {
            StepStatus::Pending => {
                self.steps[idx].1 = StepStatus::InFlight;
                Ok(())
            }
            status => Err(StepViolation::NotPending {
                step: format!("{step:?}"),
                status,
            }),
        }
    }

    /// Mark a started step as done.
    pub fn complete(&mut self, step: S) -> Result<(), StepViolation> {
        let idx = self.position(step).ok_or_else(|| StepViolation::Unknown {
            step: format!("{step:?}"),
        })?;

        match self.steps[idx].1 {
            StepStatus::InFlight => {
                self.steps[idx].1 = StepStatus::Done;
                Ok(())
            }
            status => Err(StepViolation::NotInFlight {
                step: format!("{step:?}"),
                status,
            }),
        }
    }

    /// Return every step to `Pending`.
    pub fn reset(&mut self) {
        for (_, status) in &mut self.steps {
            *status = StepStatus::Pending;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.steps
            .iter()
            .all(|(_, status)| *status == StepStatus::Done)
    }

    pub fn done_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|(_, status)| *status == StepStatus::Done)
            .count()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (S, StepStatus)> + '_ {
        self.steps.iter().copied()
    }

    fn position(&self, step: S) -> Option<usize> {
        self.steps.iter().position(|(s, _)| *s == step)
    }
}
