// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Backend service boundary.
//!
//! Each call carries the [`CorrelationId`] of the request it answers so the
//! backend can tag its logs and replies with it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tether_core::{CorrelationId, ServiceResult};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a user account.
    AccountId
);
string_id!(
    /// Identifier of a stored image.
    ImageId
);
string_id!(
    /// Identifier of a repository object.
    ObjectId
);

/// Repository object kind used for invitation codes.
pub const INVITATION_CODE_KIND: &str = "invitation-code";

/// Result of binding an invitation object to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationBinding {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait ImageService: Send + Sync {
    /// Delete an image. Returns the id of the deleted image.
    async fn delete_image(
        &self,
        correlation: CorrelationId,
        image: &ImageId,
    ) -> ServiceResult<ImageId>;
}

#[async_trait]
pub trait RepositoryService: Send + Sync {
    /// Create an empty object of the given kind.
    async fn create_object(&self, correlation: CorrelationId, kind: &str)
    -> ServiceResult<ObjectId>;

    /// Delete an object. Returns the id of the deleted object.
    async fn delete_object(
        &self,
        correlation: CorrelationId,
        object: &ObjectId,
    ) -> ServiceResult<ObjectId>;
}

#[async_trait]
pub trait AccountService: Send + Sync {
    /// Delete an account. Returns the id of the deleted account.
    async fn delete_account(
        &self,
        correlation: CorrelationId,
        account: &AccountId,
    ) -> ServiceResult<AccountId>;

    /// Turn a repository object into an invitation code owned by `account`.
    async fn bind_invitation(
        &self,
        correlation: CorrelationId,
        account: &AccountId,
        object: &ObjectId,
    ) -> ServiceResult<InvitationBinding>;
}

/// The set of services an operation may call.
#[derive(Clone)]
pub struct Services {
    pub images: Arc<dyn ImageService>,
    pub repository: Arc<dyn RepositoryService>,
    pub accounts: Arc<dyn AccountService>,
}

impl Services {
    pub fn new(
        images: Arc<dyn ImageService>,
        repository: Arc<dyn RepositoryService>,
        accounts: Arc<dyn AccountService>,
    ) -> Self {
        Self {
            images,
            repository,
            accounts,
        }
    }

    /// Use one backend for every service.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ImageService + RepositoryService + AccountService + 'static,
    {
        Self {
            images: backend.clone(),
            repository: backend.clone(),
            accounts: backend,
        }
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
