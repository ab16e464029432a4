// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL role store.
//!
//! Query functions take a pool directly so they can be reused by tooling;
//! [`PostgresRoleStore`] wires them into the [`RoleStore`] trait.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::error::RoleError;
use crate::role::Role;

use super::{AssignmentStatus, EventOwnershipRecord, RoleAssignmentRecord, RoleStore};

/// PostgreSQL-backed role store.
#[derive(Clone)]
pub struct PostgresRoleStore {
    pool: PgPool,
}

impl PostgresRoleStore {
    /// Create a new Postgres-backed role store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool (shared with the realtime listener).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ============================================================================
// Assignment Queries
// ============================================================================

/// Get the active assignment for a user on an event.
pub async fn find_active_assignment(
    pool: &PgPool,
    event_id: &str,
    user_id: &str,
) -> Result<Option<RoleAssignmentRecord>, RoleError> {
    let record = sqlx::query_as::<_, RoleAssignmentRecord>(
        r#"
        SELECT id, event_id, user_id, role, status, created_at, updated_at
        FROM event_roles
        WHERE event_id = $1 AND user_id = $2 AND status = 'active'
        "#,
    )
    .bind(event_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Get the assignment for a user on an event, whatever its status.
pub async fn get_assignment(
    pool: &PgPool,
    event_id: &str,
    user_id: &str,
) -> Result<Option<RoleAssignmentRecord>, RoleError> {
    let record = sqlx::query_as::<_, RoleAssignmentRecord>(
        r#"
        SELECT id, event_id, user_id, role, status, created_at, updated_at
        FROM event_roles
        WHERE event_id = $1 AND user_id = $2
        "#,
    )
    .bind(event_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Insert an assignment or overwrite the existing (event, user) row.
pub async fn upsert_assignment(
    pool: &PgPool,
    event_id: &str,
    user_id: &str,
    role: Role,
    status: AssignmentStatus,
) -> Result<RoleAssignmentRecord, RoleError> {
    let record = sqlx::query_as::<_, RoleAssignmentRecord>(
        r#"
        INSERT INTO event_roles (id, event_id, user_id, role, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
        ON CONFLICT (event_id, user_id) DO UPDATE
        SET role = EXCLUDED.role,
            status = EXCLUDED.status,
            updated_at = NOW()
        RETURNING id, event_id, user_id, role, status, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(event_id)
    .bind(user_id)
    .bind(role.as_str())
    .bind(status.as_str())
    .fetch_one(pool)
    .await?;

    Ok(record)
}

/// Change an assignment's status, optionally guarded on its current status.
pub async fn set_assignment_status(
    pool: &PgPool,
    event_id: &str,
    user_id: &str,
    from: Option<AssignmentStatus>,
    to: AssignmentStatus,
) -> Result<bool, RoleError> {
    let result = sqlx::query(
        r#"
        UPDATE event_roles
        SET status = $3, updated_at = NOW()
        WHERE event_id = $1
          AND user_id = $2
          AND ($4::text IS NULL OR status = $4)
        "#,
    )
    .bind(event_id)
    .bind(user_id)
    .bind(to.as_str())
    .bind(from.map(|s| s.as_str()))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// List active assignments of an event.
pub async fn list_active_assignments(
    pool: &PgPool,
    event_id: &str,
) -> Result<Vec<RoleAssignmentRecord>, RoleError> {
    let records = sqlx::query_as::<_, RoleAssignmentRecord>(
        r#"
        SELECT id, event_id, user_id, role, status, created_at, updated_at
        FROM event_roles
        WHERE event_id = $1 AND status = 'active'
        ORDER BY created_at ASC, user_id ASC
        "#,
    )
    .bind(event_id)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

// ============================================================================
// Event Queries
// ============================================================================

/// Get the owner/creator columns of an event.
pub async fn find_event_owner(
    pool: &PgPool,
    event_id: &str,
) -> Result<Option<EventOwnershipRecord>, RoleError> {
    let record = sqlx::query_as::<_, EventOwnershipRecord>(
        r#"
        SELECT event_id, owner_id, created_by
        FROM events
        WHERE event_id = $1
        "#,
    )
    .bind(event_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Create an event or update its ownership columns.
pub async fn save_event(
    pool: &PgPool,
    event_id: &str,
    owner_id: Option<&str>,
    created_by: Option<&str>,
) -> Result<(), RoleError> {
    sqlx::query(
        r#"
        INSERT INTO events (event_id, owner_id, created_by, created_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (event_id) DO UPDATE
        SET owner_id = EXCLUDED.owner_id,
            created_by = EXCLUDED.created_by
        "#,
    )
    .bind(event_id)
    .bind(owner_id)
    .bind(created_by)
    .execute(pool)
    .await?;

    Ok(())
}

// ============================================================================
// Notification Channels
// ============================================================================

/// Add a NOTIFY channel to the set the `event_roles` trigger publishes to.
pub async fn register_notify_channel(pool: &PgPool, channel: &str) -> Result<(), RoleError> {
    sqlx::query(
        r#"
        INSERT INTO event_roles_notify_channels (channel)
        VALUES ($1)
        ON CONFLICT (channel) DO NOTHING
        "#,
    )
    .bind(channel)
    .execute(pool)
    .await
    .map_err(|e| RoleError::database("register_notify_channel", e))?;

    Ok(())
}

#[async_trait]
impl RoleStore for PostgresRoleStore {
    #[instrument(skip(self))]
    async fn find_active_assignment(
        &self,
        event_id: &str,
        user_id: &str,
    ) -> Result<Option<RoleAssignmentRecord>, RoleError> {
        find_active_assignment(&self.pool, event_id, user_id).await
    }

    #[instrument(skip(self))]
    async fn find_event_owner(
        &self,
        event_id: &str,
    ) -> Result<Option<EventOwnershipRecord>, RoleError> {
        find_event_owner(&self.pool, event_id).await
    }

    async fn get_assignment(
        &self,
        event_id: &str,
        user_id: &str,
    ) -> Result<Option<RoleAssignmentRecord>, RoleError> {
        get_assignment(&self.pool, event_id, user_id).await
    }

    async fn upsert_assignment(
        &self,
        event_id: &str,
        user_id: &str,
        role: Role,
        status: AssignmentStatus,
    ) -> Result<RoleAssignmentRecord, RoleError> {
        upsert_assignment(&self.pool, event_id, user_id, role, status).await
    }

    async fn set_assignment_status(
        &self,
        event_id: &str,
        user_id: &str,
        from: Option<AssignmentStatus>,
        to: AssignmentStatus,
    ) -> Result<bool, RoleError> {
        set_assignment_status(&self.pool, event_id, user_id, from, to).await
    }

    async fn list_active_assignments(
        &self,
        event_id: &str,
    ) -> Result<Vec<RoleAssignmentRecord>, RoleError> {
        list_active_assignments(&self.pool, event_id).await
    }

    async fn save_event(
        &self,
        event_id: &str,
        owner_id: Option<&str>,
        created_by: Option<&str>,
    ) -> Result<(), RoleError> {
        save_event(&self.pool, event_id, owner_id, created_by).await
    }

    async fn health_check_db(&self) -> Result<bool, RoleError> {
        let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(row.0 == 1)
    }
}
