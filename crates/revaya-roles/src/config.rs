// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

/// Default lifetime of a cached role.
pub const DEFAULT_ROLE_CACHE_TTL: Duration = Duration::from_secs(30);

/// Default Postgres NOTIFY channel carrying `event_roles` changes.
pub const DEFAULT_REALTIME_CHANNEL: &str = "event_roles_changes";

/// Revaya roles configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Signed-in user, if any. `None` resolves every role to viewer.
    pub user_id: Option<String>,
    /// How long a resolved role is served from cache
    pub role_cache_ttl: Duration,
    /// NOTIFY channel for realtime role changes
    pub realtime_channel: String,
    /// Database pool size
    pub max_connections: u32,
    /// Events whose roles are resolved and watched on startup
    pub watch_events: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `REVAYA_DATABASE_URL`: PostgreSQL connection string
    ///
    /// Optional (with defaults):
    /// - `REVAYA_USER_ID`: signed-in user (default: none)
    /// - `REVAYA_ROLE_CACHE_TTL_SECS`: cache TTL in seconds (default: 30)
    /// - `REVAYA_REALTIME_CHANNEL`: NOTIFY channel (default: event_roles_changes)
    /// - `REVAYA_DB_MAX_CONNECTIONS`: pool size (default: 10)
    /// - `REVAYA_WATCH_EVENTS`: comma-separated event ids (default: none)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("REVAYA_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("REVAYA_DATABASE_URL"))?;

        let user_id = std::env::var("REVAYA_USER_ID")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let ttl_secs: u64 = std::env::var("REVAYA_ROLE_CACHE_TTL_SECS")
            .unwrap_or_else(|_| DEFAULT_ROLE_CACHE_TTL.as_secs().to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("REVAYA_ROLE_CACHE_TTL_SECS", "must be a positive integer")
            })?;
        if ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "REVAYA_ROLE_CACHE_TTL_SECS",
                "must be greater than zero",
            ));
        }

        let realtime_channel = std::env::var("REVAYA_REALTIME_CHANNEL")
            .unwrap_or_else(|_| DEFAULT_REALTIME_CHANNEL.to_string());
        if realtime_channel.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "REVAYA_REALTIME_CHANNEL",
                "must not be empty",
            ));
        }

        let max_connections: u32 = std::env::var("REVAYA_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("REVAYA_DB_MAX_CONNECTIONS", "must be a positive integer")
            })?;
        if max_connections == 0 {
            return Err(ConfigError::Invalid(
                "REVAYA_DB_MAX_CONNECTIONS",
                "must be a positive integer",
            ));
        }

        let watch_events = std::env::var("REVAYA_WATCH_EVENTS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url,
            user_id,
            role_cache_ttl: Duration::from_secs(ttl_secs),
            realtime_channel,
            max_connections,
            watch_events,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
