// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Revaya Roles watcher
//!
//! Resolves the configured user's roles for a set of events, keeps them fresh
//! from the `event_roles` change feed and logs every refresh. Useful for
//! checking role propagation against a live database.

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use revaya_roles::accessor::EventRoles;
use revaya_roles::cache::GetRoleOptions;
use revaya_roles::config::Config;
use revaya_roles::migrations;
use revaya_roles::persistence::PostgresRoleStore;
use revaya_roles::runtime::RoleRuntime;
use revaya_roles::session::Session;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("revaya_roles=info".parse()?),
        )
        .init();

    info!("Starting Revaya Roles watcher");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        user_id = config.user_id.as_deref().unwrap_or("<anonymous>"),
        ttl_secs = config.role_cache_ttl.as_secs(),
        channel = %config.realtime_channel,
        watch_events = config.watch_events.len(),
        "Configuration loaded"
    );

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&pool).await?;
    info!(result = row.0, "Database health check passed");

    info!("Running database migrations...");
    migrations::run_postgres(&pool).await?;
    info!("Migrations completed");

    let session = Arc::new(match &config.user_id {
        Some(user_id) => Session::signed_in(user_id.clone()),
        None => Session::anonymous(),
    });
    let store = Arc::new(PostgresRoleStore::new(pool.clone()));
    let roles = Arc::new(EventRoles::new(store, session, config.role_cache_ttl));

    let runtime = RoleRuntime::builder()
        .roles(roles.clone())
        .pool(pool.clone())
        .channel(config.realtime_channel.clone())
        .build()?
        .start();

    for event_id in &config.watch_events {
        let role = roles.get_role(event_id, GetRoleOptions::default()).await;
        info!(%event_id, role = %role, can_edit = role.can_edit(), "Watching event");
    }

    let mut refreshes = roles.subscribe();
    let refresh_log = tokio::spawn(async move {
        loop {
            match refreshes.recv().await {
                Ok(refreshed) => info!(
                    event_id = %refreshed.event_id,
                    role = %refreshed.role,
                    trigger = ?refreshed.trigger,
                    "Role refreshed"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Refresh log fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    if let Err(e) = runtime.shutdown().await {
        warn!("Realtime listener ended with error: {}", e);
    }
    refresh_log.abort();

    pool.close().await;
    info!("Shutdown complete");

    Ok(())
}
