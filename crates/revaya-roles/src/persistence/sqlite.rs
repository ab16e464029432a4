//! SQLite-backed role store, for embedded and local use.

use std::path::Path;

use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

use crate::error::RoleError;
use crate::role::Role;

use super::{AssignmentStatus, EventOwnershipRecord, RoleAssignmentRecord, RoleStore};

/// SQLite-backed role store.
#[derive(Clone)]
pub struct SqliteRoleStore {
    pool: SqlitePool,
}

impl SqliteRoleStore {
    /// Create a new SQLite role store from an existing, migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) a database file and run migrations.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, RoleError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| RoleError::DatabaseError {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| RoleError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {:?}: {}", path, e),
            })?;

        Self::migrated(pool).await
    }

    /// Open a private in-memory database and run migrations.
    pub async fn in_memory() -> Result<Self, RoleError> {
        // One connection: every new in-memory connection is a fresh database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| RoleError::database("connect", e))?;

        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, RoleError> {
        crate::migrations::run_sqlite(&pool).await.map_err(|e| RoleError::DatabaseError {
            operation: "migrate".to_string(),
            details: format!("Failed to run migrations: {}", e),
        })?;

        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl RoleStore for SqliteRoleStore {
    async fn find_active_assignment(
        &self,
        event_id: &str,
        user_id: &str,
    ) -> Result<Option<RoleAssignmentRecord>, RoleError> {
        let record = sqlx::query_as::<_, RoleAssignmentRecord>(
            r#"
            SELECT id, event_id, user_id, role, status, created_at, updated_at
            FROM event_roles
            WHERE event_id = ? AND user_id = ? AND status = 'active'
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find_event_owner(
        &self,
        event_id: &str,
    ) -> Result<Option<EventOwnershipRecord>, RoleError> {
        let record = sqlx::query_as::<_, EventOwnershipRecord>(
            "SELECT event_id, owner_id, created_by FROM events WHERE event_id = ?",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_assignment(
        &self,
        event_id: &str,
        user_id: &str,
    ) -> Result<Option<RoleAssignmentRecord>, RoleError> {
        let record = sqlx::query_as::<_, RoleAssignmentRecord>(
            r#"
            SELECT id, event_id, user_id, role, status, created_at, updated_at
            FROM event_roles
            WHERE event_id = ? AND user_id = ?
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn upsert_assignment(
        &self,
        event_id: &str,
        user_id: &str,
        role: Role,
        status: AssignmentStatus,
    ) -> Result<RoleAssignmentRecord, RoleError> {
        let now = Utc::now();
        let record = sqlx::query_as::<_, RoleAssignmentRecord>(
            r#"
            INSERT INTO event_roles (id, event_id, user_id, role, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (event_id, user_id) DO UPDATE
            SET role = excluded.role,
                status = excluded.status,
                updated_at = excluded.updated_at
            RETURNING id, event_id, user_id, role, status, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(event_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(status.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn set_assignment_status(
        &self,
        event_id: &str,
        user_id: &str,
        from: Option<AssignmentStatus>,
        to: AssignmentStatus,
    ) -> Result<bool, RoleError> {
        let result = match from {
            Some(from) => {
                sqlx::query(
                    r#"
                    UPDATE event_roles
                    SET status = ?, updated_at = ?
                    WHERE event_id = ? AND user_id = ? AND status = ?
                    "#,
                )
                .bind(to.as_str())
                .bind(Utc::now())
                .bind(event_id)
                .bind(user_id)
                .bind(from.as_str())
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE event_roles
                    SET status = ?, updated_at = ?
                    WHERE event_id = ? AND user_id = ?
                    "#,
                )
                .bind(to.as_str())
                .bind(Utc::now())
                .bind(event_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() > 0)
    }

    async fn list_active_assignments(
        &self,
        event_id: &str,
    ) -> Result<Vec<RoleAssignmentRecord>, RoleError> {
        let records = sqlx::query_as::<_, RoleAssignmentRecord>(
            r#"
            SELECT id, event_id, user_id, role, status, created_at, updated_at
            FROM event_roles
            WHERE event_id = ? AND status = 'active'
            ORDER BY created_at ASC, user_id ASC
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn save_event(
        &self,
        event_id: &str,
        owner_id: Option<&str>,
        created_by: Option<&str>,
    ) -> Result<(), RoleError> {
        sqlx::query(
            r#"
            INSERT INTO events (event_id, owner_id, created_by, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (event_id) DO UPDATE
            SET owner_id = excluded.owner_id,
                created_by = excluded.created_by
            "#,
        )
        .bind(event_id)
        .bind(owner_id)
        .bind(created_by)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn health_check_db(&self) -> Result<bool, RoleError> {
        let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(row.0 == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteRoleStore {
        SqliteRoleStore::in_memory()
            .await
            .expect("Failed to create in-memory store")
    }

    #[tokio::test]
    async fn test_save_and_find_event_owner() {
        let store = test_store().await;
        let event_id = Uuid::new_v4().to_string();

        store
            .save_event(&event_id, Some("owner-1"), Some("creator-1"))
            .await
            .expect("Failed to save event");

        let owner = store
            .find_event_owner(&event_id)
            .await
            .expect("Failed to query owner")
            .expect("Event should exist");
        assert_eq!(owner.owner_id.as_deref(), Some("owner-1"));
        assert_eq!(owner.created_by.as_deref(), Some("creator-1"));

        store
            .save_event(&event_id, Some("owner-2"), Some("creator-1"))
            .await
            .expect("Failed to update event");
        let owner = store.find_event_owner(&event_id).await.unwrap().unwrap();
        assert_eq!(owner.owner_id.as_deref(), Some("owner-2"));
    }

    #[tokio::test]
    async fn test_find_event_owner_missing() {
        let store = test_store().await;
        let owner = store.find_event_owner("nope").await.unwrap();
        assert!(owner.is_none());
    }

    #[tokio::test]
    async fn test_only_active_assignments_are_found() {
        let store = test_store().await;
        let event_id = Uuid::new_v4().to_string();
        store.save_event(&event_id, Some("owner"), None).await.unwrap();

        store
            .upsert_assignment(&event_id, "u1", Role::Editor, AssignmentStatus::Pending)
            .await
            .unwrap();
        assert!(
            store
                .find_active_assignment(&event_id, "u1")
                .await
                .unwrap()
                .is_none()
        );

        let record = store
            .upsert_assignment(&event_id, "u1", Role::Editor, AssignmentStatus::Active)
            .await
            .unwrap();
        assert_eq!(record.status, "active");

        let active = store
            .find_active_assignment(&event_id, "u1")
            .await
            .unwrap()
            .expect("Assignment should be active");
        assert_eq!(active.parsed_role().unwrap(), Role::Editor);
        assert_eq!(active.id, record.id);
    }

    #[tokio::test]
    async fn test_upsert_keeps_single_row() {
        let store = test_store().await;
        let event_id = Uuid::new_v4().to_string();
        store.save_event(&event_id, None, None).await.unwrap();

        let first = store
            .upsert_assignment(&event_id, "u1", Role::Viewer, AssignmentStatus::Active)
            .await
            .unwrap();
        let second = store
            .upsert_assignment(&event_id, "u1", Role::Admin, AssignmentStatus::Active)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.role, "admin");
        assert_eq!(store.list_active_assignments(&event_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_guarded_status_transition() {
        let store = test_store().await;
        let event_id = Uuid::new_v4().to_string();
        store.save_event(&event_id, None, None).await.unwrap();
        store
            .upsert_assignment(&event_id, "u1", Role::Editor, AssignmentStatus::Pending)
            .await
            .unwrap();

        let moved = store
            .set_assignment_status(
                &event_id,
                "u1",
                Some(AssignmentStatus::Active),
                AssignmentStatus::Removed,
            )
            .await
            .unwrap();
        assert!(!moved, "Guard should reject a row that is not active");

        let moved = store
            .set_assignment_status(
                &event_id,
                "u1",
                Some(AssignmentStatus::Pending),
                AssignmentStatus::Active,
            )
            .await
            .unwrap();
        assert!(moved);

        let moved = store
            .set_assignment_status(&event_id, "u1", None, AssignmentStatus::Removed)
            .await
            .unwrap();
        assert!(moved);

        let record = store.get_assignment(&event_id, "u1").await.unwrap().unwrap();
        assert_eq!(record.status, "removed");
    }

    #[tokio::test]
    async fn test_list_active_assignments_filters_status() {
        let store = test_store().await;
        let event_id = Uuid::new_v4().to_string();
        store.save_event(&event_id, None, None).await.unwrap();

        store
            .upsert_assignment(&event_id, "a", Role::Admin, AssignmentStatus::Active)
            .await
            .unwrap();
        store
            .upsert_assignment(&event_id, "b", Role::Editor, AssignmentStatus::Pending)
            .await
            .unwrap();
        store
            .upsert_assignment(&event_id, "c", Role::Viewer, AssignmentStatus::Declined)
            .await
            .unwrap();

        let active = store.list_active_assignments(&event_id).await.unwrap();
        let users: Vec<_> = active.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(users, vec!["a"]);
    }

    #[tokio::test]
    async fn test_from_path_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("roles.db");

        let store = SqliteRoleStore::from_path(&path).await.unwrap();
        assert!(store.health_check_db().await.unwrap());
        assert!(path.exists());
    }
}
