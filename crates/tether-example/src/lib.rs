// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Example application for tether.
//!
//! `account_cleanup` issues an invitation code and deletes an account against
//! the in-memory backend, with a simulated connection that connects on demand
//! and drops once mid-operation.
