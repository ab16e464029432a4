// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Revaya Roles - Event Role Resolution
//!
//! Answers "what may the signed-in user do on this event?" for the Revaya
//! host. Roles are resolved from the `event_roles` table and event ownership,
//! cached per user and event for a short TTL, and refreshed when something
//! signals that they may have changed.
//!
//! # Architecture
//!
//! ```text
//!   navigation ──┐   collaborator writes ──┐   Postgres NOTIFY ──┐
//!                │                         │   (RealtimeListener) │
//!                ▼                         ▼                      ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      EventRoles (handle_signal)                          │
//! │       get_role / can_edit_event / force_refresh / invalidate             │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                │                                      │
//!                ▼                                      ▼
//! ┌───────────────────────────────┐      ┌──────────────────────────────────┐
//! │ RoleCache                      │      │ RefreshNotifier                  │
//! │ TTL entries, in-flight dedup,  │      │ per-event callbacks + broadcast  │
//! │ request tokens                 │      └──────────────────────────────────┘
//! └───────────────────────────────┘
//!                │
//!                ▼
//! ┌───────────────────────────────┐      ┌──────────────────────────────────┐
//! │ RoleFetcher                    │─────▶│ RoleStore (Postgres / SQLite)    │
//! │ session → assignment → owner   │      └──────────────────────────────────┘
//! └───────────────────────────────┘
//! ```
//!
//! # Resolution
//!
//! | Step | Outcome |
//! |------|---------|
//! | No session or empty event id | `viewer` |
//! | Active `event_roles` row for (event, user) | that row's role |
//! | User is the event's `owner_id` or `created_by` | `admin` |
//! | Anything else, including lookup failures | `viewer` |
//!
//! Resolution is fail-closed: store errors never reach callers of
//! [`accessor::EventRoles::get_role`]; they degrade the result to `viewer`
//! and are logged at `warn`.
//!
//! # Caching
//!
//! Entries stay fresh for the configured TTL (30 seconds by default).
//! Concurrent lookups for one event by one user share a single fetch. A forced refresh
//! supersedes any fetch in flight, and results of superseded or invalidated
//! fetches are never written back.
//!
//! # Configuration
//!
//! See [`config::Config::from_env`] for the `REVAYA_*` environment variables
//! used by the `revaya-roles` watcher binary.

#![deny(missing_docs)]

/// Public role accessor combining cache, signals and watches.
pub mod accessor;

/// TTL role cache with in-flight deduplication.
pub mod cache;

/// Invitation and collaborator management.
pub mod collaborators;

/// Configuration loaded from environment variables.
pub mod config;

/// Error types with stable error codes.
pub mod error;

/// Role resolution against the store (fail-closed).
pub mod fetcher;

/// Embedded database migrations.
pub mod migrations;

/// Role store trait and Postgres/SQLite backends.
pub mod persistence;

/// Postgres LISTEN/NOTIFY listener for `event_roles` changes.
pub mod realtime;

/// Event role values and permission predicates.
pub mod role;

/// Event page route parsing.
pub mod route;

/// Embeddable runtime hosting the realtime listener.
pub mod runtime;

/// Authenticated-user lookup.
pub mod session;

/// Invalidation signals and refresh observers.
pub mod signals;

#[cfg(test)]
mod test_utils;

pub use accessor::EventRoles;
pub use cache::GetRoleOptions;
pub use error::{Result, RoleError};
pub use role::Role;
