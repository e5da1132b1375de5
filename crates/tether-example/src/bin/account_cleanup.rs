// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Issue an invitation code, then delete the account, over a flaky connection.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tether_core::{ConnectionMonitor, ExecutionMode, OperationError, OperationRuntime};
use tether_ops::{
    AccountId, Call, CreateInvitationCode, DeleteAccount, ImageId, InMemoryBackend, ObjectId,
    Services,
};
use tracing::{error, info};

const HANDSHAKE: Duration = Duration::from_millis(200);

/// Connects whenever an operation asks for it.
async fn connection_task(monitor: Arc<ConnectionMonitor>) {
    loop {
        monitor.connect_requested().await;
        if monitor.is_online() {
            continue;
        }
        info!("connecting");
        tokio::time::sleep(HANDSHAKE).await;
        monitor.set_online();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tether_core=info".parse()?)
                .add_directive("account_cleanup=info".parse()?),
        )
        .init();

    let runtime = OperationRuntime::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;
    info!(
        timeout_ms = runtime.config().operation_timeout_ms,
        telemetry = runtime.config().telemetry_enabled,
        "Configuration loaded"
    );

    let account = AccountId::new("acct-42");
    let avatar = ImageId::new("img-42");
    let profile = ObjectId::new("profile-42");

    let backend = Arc::new(InMemoryBackend::new().with_latency(Duration::from_millis(50)));
    backend.add_account(account.clone());
    backend.add_image(avatar.clone());
    backend.add_object(profile.clone(), "profile");
    let services = Services::from_backend(backend.clone());

    let monitor = runtime.monitor().clone();
    tokio::spawn(connection_task(monitor.clone()));
    monitor.set_ready();

    println!("Issuing invitation code (waits for the connection):");
    let invitation = runtime
        .spawn(
            CreateInvitationCode::new(account.clone(), services.clone()),
            ExecutionMode::Timed(None),
        )
        .outcome()
        .await?;
    println!("{}\n", serde_json::to_string_pretty(&invitation)?);

    println!("Deleting account (the link drops while the profile is deleted):");
    backend.fail_next(
        Call::DeleteObject,
        OperationError::connectivity_lost("link dropped"),
    );
    let handle = runtime.spawn(
        DeleteAccount::new(account, services)
            .with_avatar(avatar)
            .with_profile(profile),
        ExecutionMode::Connected,
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    monitor.set_offline();
    tokio::time::sleep(HANDSHAKE).await;
    monitor.set_online();

    let deletion = handle.outcome().await?;
    println!("{}", serde_json::to_string_pretty(&deletion)?);
    println!(
        "\nBackend calls: delete_image={} delete_object={} delete_account={}",
        backend.calls(Call::DeleteImage),
        backend.calls(Call::DeleteObject),
        backend.calls(Call::DeleteAccount),
    );

    Ok(())
}
