// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Invitation code creation: a repository object, then binding it to an account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tether_core::{
    AbsorptionPolicy, Operation, OperationError, ReplyContext, ServiceResult, StepContext,
    StepOutcome,
};

use crate::services::{AccountId, INVITATION_CODE_KIND, InvitationBinding, ObjectId, Services};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationStep {
    CreateCode,
    BindCode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvitationReply {
    Created(ObjectId),
    Bound(InvitationBinding),
}

/// A freshly issued invitation code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationCode {
    pub object: ObjectId,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Creates an invitation code owned by `owner`.
#[derive(Debug)]
pub struct CreateInvitationCode {
    owner: AccountId,
    services: Services,
    policy: AbsorptionPolicy<InvitationStep>,
    object: Option<ObjectId>,
    binding: Option<InvitationBinding>,
}

impl CreateInvitationCode {
    pub fn new(owner: AccountId, services: Services) -> Self {
        Self {
            owner,
            services,
            policy: AbsorptionPolicy::none(),
            object: None,
            binding: None,
        }
    }

    pub fn owner(&self) -> &AccountId {
        &self.owner
    }
}

impl Operation for CreateInvitationCode {
    type Step = InvitationStep;
    type Reply = InvitationReply;
    type Output = InvitationCode;

    fn tag(&self) -> &'static str {
        "create_invitation_code"
    }

    fn steps(&self) -> Vec<InvitationStep> {
        vec![InvitationStep::CreateCode, InvitationStep::BindCode]
    }

    fn absorption(&self) -> &AbsorptionPolicy<InvitationStep> {
        &self.policy
    }

    fn perform_step(
        &mut self,
        step: InvitationStep,
        ctx: &mut StepContext<'_, InvitationStep, InvitationReply>,
    ) -> ServiceResult<StepOutcome> {
        match step {
            InvitationStep::CreateCode => {
                let completion = ctx.request(InvitationReply::Created)?;
                let correlation = completion.correlation();
                let repository = self.services.repository.clone();
                completion.spawn(async move {
                    repository
                        .create_object(correlation, INVITATION_CODE_KIND)
                        .await
                });
            }
            InvitationStep::BindCode => {
                let object = self.object.clone().ok_or_else(|| {
                    OperationError::internal("binding requested before the object exists")
                })?;
                let owner = self.owner.clone();
                let completion = ctx.request(InvitationReply::Bound)?;
                let correlation = completion.correlation();
                let accounts = self.services.accounts.clone();
                completion.spawn(async move {
                    accounts.bind_invitation(correlation, &owner, &object).await
                });
            }
        }
        Ok(StepOutcome::Requested)
    }

    fn on_reply(
        &mut self,
        step: InvitationStep,
        reply: InvitationReply,
        ctx: &mut ReplyContext<'_>,
    ) -> ServiceResult<()> {
        match (step, reply) {
            (InvitationStep::CreateCode, InvitationReply::Created(object)) => {
                self.object = Some(object);
            }
            (InvitationStep::BindCode, InvitationReply::Bound(binding)) => {
                if binding.code.is_empty() {
                    ctx.report_assertion("invitation_code", "backend bound an empty code");
                }
                self.binding = Some(binding);
            }
            (step, reply) => {
                return Err(OperationError::internal(format!(
                    "{step:?} received unexpected reply {reply:?}"
                )));
            }
        }
        Ok(())
    }

    fn on_restart(&mut self) {
        self.object = None;
        self.binding = None;
    }

    fn finish(&mut self) -> ServiceResult<InvitationCode> {
        match (self.object.take(), self.binding.take()) {
            (Some(object), Some(binding)) => Ok(InvitationCode {
                object,
                code: binding.code,
                expires_at: binding.expires_at,
            }),
            _ => Err(OperationError::internal(
                "all steps done without an object and binding",
            )),
        }
    }
}
