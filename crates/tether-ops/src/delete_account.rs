// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Account deletion: avatar, then profile object, then the account itself.

use serde::{Deserialize, Serialize};
use tether_core::{
    AbsorptionPolicy, ErrorKind, Operation, OperationError, ReplyContext, ServiceResult,
    StepContext, StepOutcome,
};
use tracing::debug;

use crate::services::{AccountId, ImageId, ObjectId, Services};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionStep {
    /// Skipped when the account has no avatar
    DeleteAvatar,
    /// Skipped when the account has no profile object
    DeleteProfile,
    DeleteAccount,
}

/// Reply to any of the deletion requests: the id of what was deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionReply {
    Image(ImageId),
    Object(ObjectId),
    Account(AccountId),
}

/// Reported when the account is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDeletion {
    pub account: AccountId,
    /// The avatar was deleted by this operation
    pub avatar_deleted: bool,
    /// The profile object was deleted by this operation
    pub profile_deleted: bool,
}

/// Deletes an account and the objects that hang off it.
///
/// A `NotFound` on any step means a previous attempt already removed that
/// resource, so it counts as done. The `*_deleted` flags record deletions
/// confirmed by a reply and survive a restart.
#[derive(Debug)]
pub struct DeleteAccount {
    account: AccountId,
    avatar: Option<ImageId>,
    profile: Option<ObjectId>,
    services: Services,
    policy: AbsorptionPolicy<DeletionStep>,
    avatar_deleted: bool,
    profile_deleted: bool,
}

impl DeleteAccount {
    pub fn new(account: AccountId, services: Services) -> Self {
        let policy = AbsorptionPolicy::none()
            .absorb(DeletionStep::DeleteAvatar, ErrorKind::NotFound)
            .absorb(DeletionStep::DeleteProfile, ErrorKind::NotFound)
            .absorb(DeletionStep::DeleteAccount, ErrorKind::NotFound);
        Self {
            account,
            avatar: None,
            profile: None,
            services,
            policy,
            avatar_deleted: false,
            profile_deleted: false,
        }
    }

    pub fn with_avatar(mut self, avatar: ImageId) -> Self {
        self.avatar = Some(avatar);
        self
    }

    pub fn with_profile(mut self, profile: ObjectId) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }
}

impl Operation for DeleteAccount {
    type Step = DeletionStep;
    type Reply = DeletionReply;
    type Output = AccountDeletion;

    fn tag(&self) -> &'static str {
        "delete_account"
    }

    fn steps(&self) -> Vec<DeletionStep> {
        vec![
            DeletionStep::DeleteAvatar,
            DeletionStep::DeleteProfile,
            DeletionStep::DeleteAccount,
        ]
    }

    fn absorption(&self) -> &AbsorptionPolicy<DeletionStep> {
        &self.policy
    }

    fn perform_step(
        &mut self,
        step: DeletionStep,
        ctx: &mut StepContext<'_, DeletionStep, DeletionReply>,
    ) -> ServiceResult<StepOutcome> {
        match step {
            DeletionStep::DeleteAvatar => {
                let Some(image) = self.avatar.clone() else {
                    return Ok(StepOutcome::Skipped);
                };
                let completion = ctx.request(DeletionReply::Image)?;
                let correlation = completion.correlation();
                let images = self.services.images.clone();
                completion.spawn(async move { images.delete_image(correlation, &image).await });
            }
            DeletionStep::DeleteProfile => {
                let Some(profile) = self.profile.clone() else {
                    return Ok(StepOutcome::Skipped);
                };
                let completion = ctx.request(DeletionReply::Object)?;
                let correlation = completion.correlation();
                let repository = self.services.repository.clone();
                completion
                    .spawn(async move { repository.delete_object(correlation, &profile).await });
            }
            DeletionStep::DeleteAccount => {
                let account = self.account.clone();
                let completion = ctx.request(DeletionReply::Account)?;
                let correlation = completion.correlation();
                let accounts = self.services.accounts.clone();
                completion
                    .spawn(async move { accounts.delete_account(correlation, &account).await });
            }
        }
        Ok(StepOutcome::Requested)
    }

    fn on_reply(
        &mut self,
        step: DeletionStep,
        reply: DeletionReply,
        ctx: &mut ReplyContext<'_>,
    ) -> ServiceResult<()> {
        match (step, reply) {
            (DeletionStep::DeleteAvatar, DeletionReply::Image(image)) => {
                if Some(&image) != self.avatar.as_ref() {
                    ctx.report_assertion(
                        "reply_subject",
                        format!("avatar {:?} deleted, got {image}", self.avatar),
                    );
                }
                self.avatar_deleted = true;
            }
            (DeletionStep::DeleteProfile, DeletionReply::Object(object)) => {
                if Some(&object) != self.profile.as_ref() {
                    ctx.report_assertion(
                        "reply_subject",
                        format!("profile {:?} deleted, got {object}", self.profile),
                    );
                }
                self.profile_deleted = true;
            }
            (DeletionStep::DeleteAccount, DeletionReply::Account(account)) => {
                if account != self.account {
                    ctx.report_assertion(
                        "reply_subject",
                        format!("account {} deleted, got {account}", self.account),
                    );
                }
            }
            (step, reply) => {
                return Err(OperationError::internal(format!(
                    "{step:?} received unexpected reply {reply:?}"
                )));
            }
        }
        Ok(())
    }

    fn on_absorbed(&mut self, step: DeletionStep, error: &OperationError) {
        debug!(account = %self.account, ?step, detail = %error.detail, "already deleted");
    }

    fn finish(&mut self) -> ServiceResult<AccountDeletion> {
        Ok(AccountDeletion {
            account: self.account.clone(),
            avatar_deleted: self.avatar_deleted,
            profile_deleted: self.profile_deleted,
        })
    }
}
