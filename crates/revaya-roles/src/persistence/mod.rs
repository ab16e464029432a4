//! Persistence interfaces and backends for revaya-roles.
//!
//! The role store is the only code that touches `event_roles` and `events`.
//! Everything else goes through [`crate::accessor::EventRoles`].

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresRoleStore;
pub use self::sqlite::SqliteRoleStore;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RoleError;
use crate::role::Role;

/// Role assignment row from `event_roles`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoleAssignmentRecord {
    /// Row identifier.
    pub id: String,
    /// Event the role applies to.
    pub event_id: String,
    /// User holding the role.
    pub user_id: String,
    /// Role text (admin, editor, viewer).
    pub role: String,
    /// Invitation lifecycle status (pending, active, declined, removed).
    pub status: String,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row last changed.
    pub updated_at: DateTime<Utc>,
}

impl RoleAssignmentRecord {
    /// Parse the stored role text.
    pub fn parsed_role(&self) -> Result<Role, RoleError> {
        self.role.parse()
    }
}

/// Ownership columns of an `events` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventOwnershipRecord {
    /// Event identifier.
    pub event_id: String,
    /// Current owner.
    pub owner_id: Option<String>,
    /// Original creator.
    pub created_by: Option<String>,
}

impl EventOwnershipRecord {
    /// True when either the owner or the creator is `user_id`.
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id.as_deref() == Some(user_id) || self.created_by.as_deref() == Some(user_id)
    }
}

/// Lifecycle of an `event_roles` row. Only `Active` rows grant a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    /// Invited, not yet answered.
    Pending,
    /// Accepted; the role is in effect.
    Active,
    /// Invitation turned down.
    Declined,
    /// Collaborator removed from the event.
    Removed,
}

impl AssignmentStatus {
    /// Text form stored in `event_roles.status`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Declined => "declined",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentStatus {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "declined" => Ok(Self::Declined),
            "removed" => Ok(Self::Removed),
            other => Err(RoleError::ValidationError {
                field: "status".to_string(),
                message: format!("unknown assignment status '{}'", other),
            }),
        }
    }
}

/// Storage backend for role assignments and event ownership.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Active assignment for (event, user), if any.
    async fn find_active_assignment(
        &self,
        event_id: &str,
        user_id: &str,
    ) -> Result<Option<RoleAssignmentRecord>, RoleError>;

    /// Ownership columns of an event, if the event exists.
    async fn find_event_owner(
        &self,
        event_id: &str,
    ) -> Result<Option<EventOwnershipRecord>, RoleError>;

    /// Assignment for (event, user) in any status.
    async fn get_assignment(
        &self,
        event_id: &str,
        user_id: &str,
    ) -> Result<Option<RoleAssignmentRecord>, RoleError>;

    /// Insert an assignment, or overwrite role and status of the existing one.
    async fn upsert_assignment(
        &self,
        event_id: &str,
        user_id: &str,
        role: Role,
        status: AssignmentStatus,
    ) -> Result<RoleAssignmentRecord, RoleError>;

    /// Move an assignment to `to`. When `from` is set, only a row currently in
    /// that status is changed. Returns whether a row was updated.
    async fn set_assignment_status(
        &self,
        event_id: &str,
        user_id: &str,
        from: Option<AssignmentStatus>,
        to: AssignmentStatus,
    ) -> Result<bool, RoleError>;

    /// All active assignments of an event, oldest first.
    async fn list_active_assignments(
        &self,
        event_id: &str,
    ) -> Result<Vec<RoleAssignmentRecord>, RoleError>;

    /// Create or update an event's ownership columns.
    async fn save_event(
        &self,
        event_id: &str,
        owner_id: Option<&str>,
        created_by: Option<&str>,
    ) -> Result<(), RoleError>;

    /// Round-trip a trivial query.
    async fn health_check_db(&self) -> Result<bool, RoleError>;
}
