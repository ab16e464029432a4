// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for revaya-roles.
//!
//! [`RoleRuntime`] runs the realtime listener inside an existing tokio
//! application, so cached roles follow `event_roles` changes without polling.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use revaya_roles::accessor::EventRoles;
//! use revaya_roles::persistence::PostgresRoleStore;
//! use revaya_roles::runtime::RoleRuntime;
//! use revaya_roles::session::Session;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = sqlx::PgPool::connect("postgres://...").await?;
//!     let store = Arc::new(PostgresRoleStore::new(pool.clone()));
//!     let session = Arc::new(Session::signed_in("user-1"));
//!     let roles = Arc::new(EventRoles::new(store, session, Duration::from_secs(30)));
//!
//!     let runtime = RoleRuntime::builder()
//!         .roles(roles.clone())
//!         .pool(pool)
//!         .build()?
//!         .start();
//!
//!     // ... run your application ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::accessor::EventRoles;
use crate::config::DEFAULT_REALTIME_CHANNEL;
use crate::error::RoleError;
use crate::realtime::{RealtimeListener, RealtimeListenerConfig};

/// Builder for creating a [`RoleRuntime`].
pub struct RoleRuntimeBuilder {
    roles: Option<Arc<EventRoles>>,
    pool: Option<PgPool>,
    channel: String,
}

impl std::fmt::Debug for RoleRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleRuntimeBuilder")
            .field("roles", &self.roles.as_ref().map(|_| "..."))
            .field("pool", &self.pool.as_ref().map(|_| "..."))
            .field("channel", &self.channel)
            .finish()
    }
}

impl Default for RoleRuntimeBuilder {
    fn default() -> Self {
        Self {
            roles: None,
            pool: None,
            channel: DEFAULT_REALTIME_CHANNEL.to_string(),
        }
    }
}

impl RoleRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the role accessor to keep fresh (required).
    pub fn roles(mut self, roles: Arc<EventRoles>) -> Self {
        self.roles = Some(roles);
        self
    }

    /// Set the Postgres pool used for LISTEN (required).
    pub fn pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Set the NOTIFY channel.
    ///
    /// Default: `event_roles_changes`
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<RoleRuntimeConfig> {
        let roles = self
            .roles
            .ok_or_else(|| anyhow::anyhow!("roles is required"))?;
        let pool = self
            .pool
            .ok_or_else(|| anyhow::anyhow!("pool is required"))?;
        if self.channel.trim().is_empty() {
            anyhow::bail!("channel must not be empty");
        }

        Ok(RoleRuntimeConfig {
            roles,
            pool,
            channel: self.channel,
        })
    }
}

/// Configuration for a [`RoleRuntime`].
pub struct RoleRuntimeConfig {
    roles: Arc<EventRoles>,
    pool: PgPool,
    channel: String,
}

impl std::fmt::Debug for RoleRuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleRuntimeConfig")
            .field("roles", &"...")
            .field("pool", &"...")
            .field("channel", &self.channel)
            .finish()
    }
}

impl RoleRuntimeConfig {
    /// Start the runtime, spawning the realtime listener task.
    pub fn start(self) -> RoleRuntime {
        let listener = RealtimeListener::new(
            self.pool,
            self.roles.clone(),
            RealtimeListenerConfig {
                channel: self.channel.clone(),
            },
        );
        let shutdown = listener.shutdown_handle();
        let listener_handle = tokio::spawn(async move { listener.run().await });

        info!(channel = %self.channel, "RoleRuntime started");

        RoleRuntime {
            listener_handle,
            shutdown,
            roles: self.roles,
        }
    }
}

/// A running realtime listener bound to an [`EventRoles`].
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct RoleRuntime {
    listener_handle: JoinHandle<Result<(), RoleError>>,
    shutdown: Arc<Notify>,
    roles: Arc<EventRoles>,
}

impl RoleRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> RoleRuntimeBuilder {
        RoleRuntimeBuilder::new()
    }

    /// The accessor kept fresh by this runtime.
    pub fn roles(&self) -> &Arc<EventRoles> {
        &self.roles
    }

    /// Stop the listener and wait for it to exit.
    ///
    /// Returns the listener's subscription error if it never got going.
    pub async fn shutdown(self) -> Result<()> {
        info!("RoleRuntime shutting down...");

        // A stored permit covers a listener that is not waiting yet.
        self.shutdown.notify_one();

        match self.listener_handle.await {
            Ok(Ok(())) => {
                info!("RoleRuntime shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("RoleRuntime listener error: {}", e);
                Err(e.into())
            }
            Err(e) => {
                error!("RoleRuntime listener task panicked: {}", e);
                Err(anyhow::anyhow!("listener task panicked: {}", e))
            }
        }
    }

    /// Check if the listener is still running.
    pub fn is_running(&self) -> bool {
        !self.listener_handle.is_finished()
    }
}
