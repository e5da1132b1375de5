// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Account and invitation operations.
//!
//! Each operation here is a [`tether_core::Operation`]: it declares its steps,
//! issues one backend call per step and folds the replies into its output.
//!
//! | Operation | Steps | Absorbed |
//! |-----------|-------|----------|
//! | [`DeleteAccount`] | delete avatar, delete profile, delete account | `NotFound` on every step |
//! | [`CreateInvitationCode`] | create code object, bind code | nothing |
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether_core::{ExecutionMode, OperationRuntime};
//! use tether_ops::{AccountId, DeleteAccount, InMemoryBackend, Services};
//!
//! let backend = Arc::new(InMemoryBackend::new());
//! let services = Services::from_backend(backend);
//! let runtime = OperationRuntime::from_env()?;
//!
//! let deletion = runtime
//!     .spawn(
//!         DeleteAccount::new(AccountId::new("acct-1"), services),
//!         ExecutionMode::Connected,
//!     )
//!     .outcome()
//!     .await?;
//! ```

pub mod delete_account;
pub mod invitation;
pub mod memory;
pub mod services;

pub use delete_account::{AccountDeletion, DeleteAccount, DeletionReply, DeletionStep};
pub use invitation::{CreateInvitationCode, InvitationCode, InvitationReply, InvitationStep};
pub use memory::{Call, InMemoryBackend};
pub use services::{
    AccountId, AccountService, INVITATION_CODE_KIND, ImageId, ImageService, InvitationBinding,
    ObjectId, RepositoryService, Services,
};
