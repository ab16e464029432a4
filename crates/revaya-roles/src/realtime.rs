// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Realtime `event_roles` change feed.
//!
//! The Postgres migrations install a trigger that publishes every insert,
//! update and delete on `event_roles` as JSON to each channel listed in
//! `event_roles_notify_channels`:
//!
//! ```json
//! {"op": "UPDATE", "event_id": "...", "user_id": "...", "role": "editor", "status": "active"}
//! ```
//!
//! [`RealtimeListener`] registers its configured channel in that table,
//! LISTENs on it and hands each change to
//! [`EventRoles::handle_signal`], which drops changes for unwatched events
//! and for other users.
//!
//! If the subscription cannot be set up, the listener logs and exits; roles
//! are then only refreshed by reads, navigation and explicit signals.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::accessor::EventRoles;
use crate::config::DEFAULT_REALTIME_CHANNEL;
use crate::error::RoleError;
use crate::persistence::postgres::register_notify_channel;
use crate::signals::RoleSignal;

/// Pause before receiving again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Row operation reported by the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    /// Row inserted.
    Insert,
    /// Row updated.
    Update,
    /// Row deleted.
    Delete,
}

/// One `event_roles` row change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentChange {
    /// Operation.
    pub op: ChangeOp,
    /// Event of the changed row.
    pub event_id: String,
    /// User of the changed row.
    pub user_id: String,
    /// Role after the change (before it, for deletes).
    #[serde(default)]
    pub role: Option<String>,
    /// Status after the change (before it, for deletes).
    #[serde(default)]
    pub status: Option<String>,
}

impl AssignmentChange {
    /// Parse a NOTIFY payload.
    pub fn from_payload(payload: &str) -> Result<Self, RoleError> {
        let change: Self =
            serde_json::from_str(payload).map_err(|e| RoleError::ValidationError {
                field: "payload".to_string(),
                message: e.to_string(),
            })?;
        if change.event_id.is_empty() || change.user_id.is_empty() {
            return Err(RoleError::ValidationError {
                field: "payload".to_string(),
                message: "event_id and user_id are required".to_string(),
            });
        }
        Ok(change)
    }
}

/// Configuration for the realtime listener.
#[derive(Debug, Clone)]
pub struct RealtimeListenerConfig {
    /// NOTIFY channel to LISTEN on.
    pub channel: String,
}

impl Default for RealtimeListenerConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_REALTIME_CHANNEL.to_string(),
        }
    }
}

/// Background worker turning `event_roles` notifications into role signals.
pub struct RealtimeListener {
    pool: PgPool,
    roles: Arc<EventRoles>,
    config: RealtimeListenerConfig,
    shutdown: Arc<Notify>,
}

impl RealtimeListener {
    /// Create a new listener.
    pub fn new(pool: PgPool, roles: Arc<EventRoles>, config: RealtimeListenerConfig) -> Self {
        Self {
            pool,
            roles,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Listen until shutdown.
    ///
    /// Returns a [`RoleError::SubscriptionError`] if the LISTEN cannot be
    /// established. Connection errors after that are logged and the listener
    /// keeps receiving (sqlx reconnects on the next receive).
    pub async fn run(&self) -> Result<(), RoleError> {
        let channel = self.config.channel.as_str();
        let mut listener = match self.subscribe().await {
            Ok(listener) => listener,
            Err(e) => {
                error!(channel, error = %e, "Realtime subscription failed");
                return Err(e);
            }
        };

        info!(channel, "Realtime listener started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Realtime listener received shutdown signal");
                    break;
                }

                notification = listener.recv() => match notification {
                    Ok(notification) => self.dispatch(notification.payload()).await,
                    Err(e) => {
                        warn!(channel, error = %e, "Realtime connection error");
                        if self.pause_before_reconnect().await {
                            info!("Realtime listener received shutdown signal");
                            break;
                        }
                    }
                }
            }
        }

        info!("Realtime listener stopped");
        Ok(())
    }

    /// Wait out the reconnect delay. Returns `true` if shutdown was signalled
    /// meanwhile.
    async fn pause_before_reconnect(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.notified() => true,
            _ = tokio::time::sleep(RECONNECT_DELAY) => false,
        }
    }

    async fn subscribe(&self) -> Result<PgListener, RoleError> {
        let subscription_error = |e: sqlx::Error| RoleError::SubscriptionError {
            channel: self.config.channel.clone(),
            details: e.to_string(),
        };

        register_notify_channel(&self.pool, &self.config.channel)
            .await
            .map_err(|e| RoleError::SubscriptionError {
                channel: self.config.channel.clone(),
                details: e.to_string(),
            })?;
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(subscription_error)?;
        listener
            .listen(&self.config.channel)
            .await
            .map_err(subscription_error)?;
        Ok(listener)
    }

    async fn dispatch(&self, payload: &str) {
        match AssignmentChange::from_payload(payload) {
            Ok(change) => {
                debug!(
                    event_id = %change.event_id,
                    user_id = %change.user_id,
                    op = ?change.op,
                    "Role assignment changed"
                );
                self.roles
                    .handle_signal(RoleSignal::AssignmentChanged(change))
                    .await;
            }
            Err(e) => {
                warn!(error = %e, payload, "Skipping malformed realtime payload");
            }
        }
    }
}
