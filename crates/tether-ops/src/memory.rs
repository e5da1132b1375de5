// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory backend for tests and local runs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tether_core::{CorrelationId, OperationError, ServiceResult};
use tracing::debug;

use crate::services::{
    AccountId, AccountService, INVITATION_CODE_KIND, ImageId, ImageService, InvitationBinding,
    ObjectId, RepositoryService,
};

/// Default lifetime of a bound invitation code, in days.
pub const DEFAULT_INVITATION_TTL_DAYS: i64 = 7;

/// A backend call, for counting and failure scripting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    DeleteImage,
    CreateObject,
    DeleteObject,
    DeleteAccount,
    BindInvitation,
}

#[derive(Default)]
struct State {
    accounts: HashSet<AccountId>,
    images: HashSet<ImageId>,
    objects: HashMap<ObjectId, String>,
    calls: HashMap<Call, usize>,
    failures: HashMap<Call, VecDeque<OperationError>>,
    correlations: Vec<CorrelationId>,
    next_object: u64,
    next_code: u64,
}

/// Implements every service over in-memory sets.
///
/// Failures scripted with [`fail_next`](Self::fail_next) are returned once,
/// in order, by the next calls of that kind.
pub struct InMemoryBackend {
    state: Mutex<State>,
    latency: Option<Duration>,
    invitation_ttl: chrono::Duration,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            latency: None,
            invitation_ttl: chrono::Duration::days(DEFAULT_INVITATION_TTL_DAYS),
        }
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_invitation_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.invitation_ttl = ttl;
        self
    }

    pub fn add_account(&self, account: AccountId) {
        self.lock().accounts.insert(account);
    }

    pub fn add_image(&self, image: ImageId) {
        self.lock().images.insert(image);
    }

    pub fn add_object(&self, object: ObjectId, kind: impl Into<String>) {
        self.lock().objects.insert(object, kind.into());
    }

    pub fn has_account(&self, account: &AccountId) -> bool {
        self.lock().accounts.contains(account)
    }

    pub fn has_image(&self, image: &ImageId) -> bool {
        self.lock().images.contains(image)
    }

    pub fn has_object(&self, object: &ObjectId) -> bool {
        self.lock().objects.contains_key(object)
    }

    pub fn object_kind(&self, object: &ObjectId) -> Option<String> {
        self.lock().objects.get(object).cloned()
    }

    /// Make the next call of kind `call` fail with `error`.
    pub fn fail_next(&self, call: Call, error: OperationError) {
        self.lock().failures.entry(call).or_default().push_back(error);
    }

    /// How many times `call` was made, failed calls included.
    pub fn calls(&self, call: Call) -> usize {
        self.lock().calls.get(&call).copied().unwrap_or(0)
    }

    /// Correlation ids of every call, in arrival order.
    pub fn correlations(&self) -> Vec<CorrelationId> {
        self.lock().correlations.clone()
    }

    /// Count the call and pop a scripted failure for it, if any.
    async fn enter(&self, call: Call, correlation: CorrelationId) -> ServiceResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        *state.calls.entry(call).or_default() += 1;
        state.correlations.push(correlation);
        debug!(?call, %correlation, "backend call");

        match state.failures.get_mut(&call).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ImageService for InMemoryBackend {
    async fn delete_image(
        &self,
        correlation: CorrelationId,
        image: &ImageId,
    ) -> ServiceResult<ImageId> {
        self.enter(Call::DeleteImage, correlation).await?;
        if self.lock().images.remove(image) {
            Ok(image.clone())
        } else {
            Err(OperationError::not_found(format!("image {image}")))
        }
    }
}

#[async_trait]
impl RepositoryService for InMemoryBackend {
    async fn create_object(
        &self,
        correlation: CorrelationId,
        kind: &str,
    ) -> ServiceResult<ObjectId> {
        self.enter(Call::CreateObject, correlation).await?;
        if kind.is_empty() {
            return Err(OperationError::bad_request("object kind is empty"));
        }

        let mut state = self.lock();
        state.next_object += 1;
        let object = ObjectId(format!("obj-{}", state.next_object));
        state.objects.insert(object.clone(), kind.to_string());
        Ok(object)
    }

    async fn delete_object(
        &self,
        correlation: CorrelationId,
        object: &ObjectId,
    ) -> ServiceResult<ObjectId> {
        self.enter(Call::DeleteObject, correlation).await?;
        match self.lock().objects.remove(object) {
            Some(_) => Ok(object.clone()),
            None => Err(OperationError::not_found(format!("object {object}"))),
        }
    }
}

#[async_trait]
impl AccountService for InMemoryBackend {
    async fn delete_account(
        &self,
        correlation: CorrelationId,
        account: &AccountId,
    ) -> ServiceResult<AccountId> {
        self.enter(Call::DeleteAccount, correlation).await?;
        if self.lock().accounts.remove(account) {
            Ok(account.clone())
        } else {
            Err(OperationError::not_found(format!("account {account}")))
        }
    }

    async fn bind_invitation(
        &self,
        correlation: CorrelationId,
        account: &AccountId,
        object: &ObjectId,
    ) -> ServiceResult<InvitationBinding> {
        self.enter(Call::BindInvitation, correlation).await?;

        let mut state = self.lock();
        if !state.accounts.contains(account) {
            return Err(OperationError::not_found(format!("account {account}")));
        }
        match state.objects.get(object) {
            None => return Err(OperationError::not_found(format!("object {object}"))),
            Some(kind) if kind != INVITATION_CODE_KIND => {
                return Err(OperationError::bad_request(format!(
                    "object {object} is a {kind}, not an invitation code"
                )));
            }
            Some(_) => {}
        }

        state.next_code += 1;
        Ok(InvitationBinding {
            code: format!("INV-{:06}", state.next_code),
            expires_at: Utc::now() + self.invitation_ttl,
        })
    }
}
