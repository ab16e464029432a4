// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Authenticated-user lookup.

use std::sync::{PoisonError, RwLock};

/// Source of the currently authenticated user.
pub trait SessionProvider: Send + Sync {
    /// The signed-in user's id, or `None` when there is no valid session.
    fn current_user_id(&self) -> Option<String>;

    /// End the session. Providers backed by an external identity service may
    /// leave this as a no-op.
    fn sign_out(&self) {}
}

/// In-process session holding at most one signed-in user.
#[derive(Debug, Default)]
pub struct Session {
    user_id: RwLock<Option<String>>,
}

impl Session {
    /// A session with nobody signed in.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A session already signed in as `user_id`.
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            user_id: RwLock::new(Some(user_id.into())),
        }
    }

    /// Replace the signed-in user.
    pub fn sign_in(&self, user_id: impl Into<String>) {
        *self.user_id.write().unwrap_or_else(PoisonError::into_inner) = Some(user_id.into());
    }

    /// Drop the signed-in user.
    pub fn sign_out(&self) {
        *self.user_id.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl SessionProvider for Session {
    fn current_user_id(&self) -> Option<String> {
        self.user_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|id| !id.is_empty())
    }

    fn sign_out(&self) {
        Session::sign_out(self);
    }
}
