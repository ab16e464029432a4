// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for revaya-roles.
//!
//! Role *resolution* never returns these to callers (it degrades to `viewer`).
//! They surface from store writes, collaborator operations and the realtime
//! listener setup.

use std::fmt;

/// Result type using RoleError
pub type Result<T> = std::result::Result<T, RoleError>;

/// Errors raised by the role store and the operations built on it.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum RoleError {
    /// Event record does not exist.
    EventNotFound {
        /// The event ID that was not found.
        event_id: String,
    },

    /// No invitation in the expected state exists for this user.
    InvitationNotFound {
        /// The event ID.
        event_id: String,
        /// The invited user.
        user_id: String,
        /// The status the invitation was expected to be in.
        expected_status: String,
    },

    /// A stored or supplied role string is not a known role.
    InvalidRole {
        /// The offending value.
        value: String,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// Realtime subscription could not be established or was malformed.
    SubscriptionError {
        /// The channel involved.
        channel: String,
        /// Error details.
        details: String,
    },
}

impl RoleError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EventNotFound { .. } => "EVENT_NOT_FOUND",
            Self::InvitationNotFound { .. } => "INVITATION_NOT_FOUND",
            Self::InvalidRole { .. } => "INVALID_ROLE",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
            Self::SubscriptionError { .. } => "SUBSCRIPTION_ERROR",
        }
    }

    pub(crate) fn database(operation: &str, err: impl fmt::Display) -> Self {
        Self::DatabaseError {
            operation: operation.to_string(),
            details: err.to_string(),
        }
    }
}

impl fmt::Display for RoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EventNotFound { event_id } => {
                write!(f, "Event '{}' not found", event_id)
            }
            Self::InvitationNotFound {
                event_id,
                user_id,
                expected_status,
            } => {
                write!(
                    f,
                    "No {} invitation for user '{}' on event '{}'",
                    expected_status, user_id, event_id
                )
            }
            Self::InvalidRole { value } => {
                write!(f, "Unknown role '{}'", value)
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
            Self::SubscriptionError { channel, details } => {
                write!(f, "Subscription error on '{}': {}", channel, details)
            }
        }
    }
}

impl std::error::Error for RoleError {}

impl From<sqlx::Error> for RoleError {
    fn from(err: sqlx::Error) -> Self {
        RoleError::database("query", err)
    }
}

impl From<serde_json::Error> for RoleError {
    fn from(err: serde_json::Error) -> Self {
        RoleError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}
