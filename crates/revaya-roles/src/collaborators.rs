// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event collaborator management.
//!
//! Invitations are `event_roles` rows moving through
//! `pending -> active | declined`, and any row can be moved to `removed`.
//! Every write is followed by a `CollaboratorUpdated` signal, so the current
//! user's cached role for the event is refreshed right away.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::accessor::EventRoles;
use crate::error::{Result, RoleError};
use crate::persistence::{AssignmentStatus, RoleAssignmentRecord, RoleStore};
use crate::role::Role;
use crate::signals::RoleSignal;

/// Invitation and collaborator operations for events.
pub struct CollaboratorDirectory {
    store: Arc<dyn RoleStore>,
    roles: Arc<EventRoles>,
}

impl CollaboratorDirectory {
    /// Create a directory writing to `store` and refreshing `roles`.
    pub fn new(store: Arc<dyn RoleStore>, roles: Arc<EventRoles>) -> Self {
        Self { store, roles }
    }

    /// Invite `user_id` to `event_id` with `role`.
    ///
    /// Re-inviting a user resets their row to `pending` with the new role.
    #[instrument(skip(self))]
    pub async fn invite(
        &self,
        event_id: &str,
        user_id: &str,
        role: Role,
    ) -> Result<RoleAssignmentRecord> {
        validate_id("event_id", event_id)?;
        validate_id("user_id", user_id)?;

        if self.store.find_event_owner(event_id).await?.is_none() {
            return Err(RoleError::EventNotFound {
                event_id: event_id.to_string(),
            });
        }

        let record = self
            .store
            .upsert_assignment(event_id, user_id, role, AssignmentStatus::Pending)
            .await?;
        info!(event_id, user_id, role = %role, "Collaborator invited");

        self.collaborators_changed(event_id).await;
        Ok(record)
    }

    /// Accept a pending invitation.
    pub async fn accept_invitation(&self, event_id: &str, user_id: &str) -> Result<()> {
        self.answer(event_id, user_id, AssignmentStatus::Active).await
    }

    /// Decline a pending invitation.
    pub async fn decline_invitation(&self, event_id: &str, user_id: &str) -> Result<()> {
        self.answer(event_id, user_id, AssignmentStatus::Declined).await
    }

    /// Remove a collaborator regardless of the row's state.
    ///
    /// Returns `false` when the user had no row for the event.
    #[instrument(skip(self))]
    pub async fn remove_collaborator(&self, event_id: &str, user_id: &str) -> Result<bool> {
        let removed = self
            .store
            .set_assignment_status(event_id, user_id, None, AssignmentStatus::Removed)
            .await?;

        if removed {
            info!(event_id, user_id, "Collaborator removed");
            self.collaborators_changed(event_id).await;
        }
        Ok(removed)
    }

    /// Active collaborators of an event.
    pub async fn list_collaborators(&self, event_id: &str) -> Result<Vec<RoleAssignmentRecord>> {
        self.store.list_active_assignments(event_id).await
    }

    #[instrument(skip(self))]
    async fn answer(&self, event_id: &str, user_id: &str, to: AssignmentStatus) -> Result<()> {
        let changed = self
            .store
            .set_assignment_status(event_id, user_id, Some(AssignmentStatus::Pending), to)
            .await?;

        if !changed {
            return Err(RoleError::InvitationNotFound {
                event_id: event_id.to_string(),
                user_id: user_id.to_string(),
                expected_status: AssignmentStatus::Pending.to_string(),
            });
        }

        info!(event_id, user_id, status = %to, "Invitation answered");
        self.collaborators_changed(event_id).await;
        Ok(())
    }

    async fn collaborators_changed(&self, event_id: &str) {
        self.roles
            .handle_signal(RoleSignal::CollaboratorUpdated {
                event_id: event_id.to_string(),
            })
            .await;
    }
}

fn validate_id(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RoleError::ValidationError {
            field: field.to_string(),
            message: "must not be empty".to_string(),
        });
    }
    Ok(())
}
