// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Role resolution against the role store.
//!
//! Resolution runs two lookups in order:
//!
//! 1. an `active` row in `event_roles` for (event, user), whose role wins outright;
//! 2. the event's `owner_id` / `created_by`, which grants `admin` on a match.
//!
//! Each lookup reports [`Lookup::Found`], [`Lookup::Missing`] or
//! [`Lookup::Failed`]. A failed lookup counts as missing and resolution moves
//! on. The fail-closed policy lives in exactly one place,
//! [`RoleFetcher::resolve_as`]: whatever is not positively established is
//! `viewer`.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::persistence::{EventOwnershipRecord, RoleStore};
use crate::role::Role;
use crate::session::SessionProvider;

/// Outcome of a single lookup step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    /// The record exists.
    Found(T),
    /// The query succeeded and there is no record.
    Missing,
    /// The query failed; treated as missing.
    Failed(String),
}

/// The two lookup steps of a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStep {
    /// Active `event_roles` row.
    Assignment,
    /// `events` owner/creator columns.
    Ownership,
}

/// A lookup that failed during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    /// Which step failed.
    pub step: LookupStep,
    /// Error message from the store.
    pub reason: String,
}

/// How a resolved role was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleSource {
    /// No authenticated user; nothing was queried.
    NoSession,
    /// Empty event id; nothing was queried.
    InvalidEvent,
    /// Taken from an active assignment row.
    Assignment,
    /// The user owns or created the event.
    Ownership,
    /// Neither source granted anything.
    NoMatch,
}

/// Result of resolving one event's role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Effective role.
    pub role: Role,
    /// Where the role came from.
    pub source: RoleSource,
    /// Lookups that failed on the way. Non-empty means the role may be
    /// lower than the user's real privilege.
    pub failures: Vec<StepFailure>,
}

impl Resolution {
    fn new(role: Role, source: RoleSource, failures: Vec<StepFailure>) -> Self {
        Self {
            role,
            source,
            failures,
        }
    }

    /// True when at least one lookup failed.
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Resolves the signed-in user's role for an event.
pub struct RoleFetcher {
    store: Arc<dyn RoleStore>,
    session: Arc<dyn SessionProvider>,
}

impl RoleFetcher {
    /// Create a fetcher over a store and a session.
    pub fn new(store: Arc<dyn RoleStore>, session: Arc<dyn SessionProvider>) -> Self {
        Self { store, session }
    }

    /// The signed-in user, as seen by this fetcher.
    pub fn current_user_id(&self) -> Option<String> {
        self.session.current_user_id()
    }

    /// Resolve the effective role for the signed-in user. Never fails.
    pub async fn fetch_role(&self, event_id: &str) -> Role {
        self.resolve(event_id).await.role
    }

    /// Resolve the effective role for `user_id`. Never fails.
    pub async fn fetch_role_as(&self, user_id: Option<&str>, event_id: &str) -> Role {
        self.resolve_as(user_id, event_id).await.role
    }

    /// Resolve the signed-in user's role together with how it was reached.
    pub async fn resolve(&self, event_id: &str) -> Resolution {
        let user_id = self.session.current_user_id();
        self.resolve_as(user_id.as_deref(), event_id).await
    }

    /// Resolve `user_id`'s role together with how it was reached.
    ///
    /// `None` is an anonymous caller.
    #[instrument(skip(self), fields(role = tracing::field::Empty, source = tracing::field::Empty))]
    pub async fn resolve_as(&self, user_id: Option<&str>, event_id: &str) -> Resolution {
        let Some(user_id) = user_id.filter(|id| !id.is_empty()) else {
            debug!("No authenticated session, resolving to viewer");
            return Resolution::new(Role::Viewer, RoleSource::NoSession, Vec::new());
        };

        if event_id.trim().is_empty() {
            warn!("Empty event id, resolving to viewer");
            return Resolution::new(Role::Viewer, RoleSource::InvalidEvent, Vec::new());
        }

        let mut failures = Vec::new();

        match self.lookup_assignment(event_id, user_id).await {
            Lookup::Found(role) => {
                let resolution = Resolution::new(role, RoleSource::Assignment, failures);
                record(&resolution);
                return resolution;
            }
            Lookup::Missing => {}
            Lookup::Failed(reason) => failures.push(StepFailure {
                step: LookupStep::Assignment,
                reason,
            }),
        }

        let resolution = match self.lookup_ownership(event_id).await {
            Lookup::Found(event) if event.is_owned_by(user_id) => {
                Resolution::new(Role::Admin, RoleSource::Ownership, failures)
            }
            Lookup::Found(_) | Lookup::Missing => {
                Resolution::new(Role::Viewer, RoleSource::NoMatch, failures)
            }
            Lookup::Failed(reason) => {
                failures.push(StepFailure {
                    step: LookupStep::Ownership,
                    reason,
                });
                Resolution::new(Role::Viewer, RoleSource::NoMatch, failures)
            }
        };

        record(&resolution);
        resolution
    }

    async fn lookup_assignment(&self, event_id: &str, user_id: &str) -> Lookup<Role> {
        match self.store.find_active_assignment(event_id, user_id).await {
            Ok(Some(record)) => match record.parsed_role() {
                Ok(role) => Lookup::Found(role),
                Err(e) => {
                    warn!(error = %e, "Active assignment carries an unknown role");
                    Lookup::Failed(e.to_string())
                }
            },
            Ok(None) => Lookup::Missing,
            Err(e) => {
                warn!(error = %e, "Assignment lookup failed");
                Lookup::Failed(e.to_string())
            }
        }
    }

    async fn lookup_ownership(&self, event_id: &str) -> Lookup<EventOwnershipRecord> {
        match self.store.find_event_owner(event_id).await {
            Ok(Some(record)) => Lookup::Found(record),
            Ok(None) => Lookup::Missing,
            Err(e) => {
                warn!(error = %e, "Ownership lookup failed");
                Lookup::Failed(e.to_string())
            }
        }
    }
}

fn record(resolution: &Resolution) {
    let span = tracing::Span::current();
    span.record("role", resolution.role.as_str());
    span.record("source", tracing::field::debug(resolution.source));
    debug!(degraded = resolution.is_degraded(), "Role resolved");
}
