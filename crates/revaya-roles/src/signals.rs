// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Invalidation signals and refresh observers.
//!
//! Producers (navigation, realtime feed, collaborator flows) hand a
//! [`RoleSignal`] to [`crate::accessor::EventRoles::handle_signal`]. After the
//! forced refresh, every observer registered with [`RefreshNotifier`] for
//! that event is called, and the refresh is broadcast to stream subscribers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::realtime::AssignmentChange;
use crate::role::Role;

/// Default buffer of the refresh broadcast channel.
pub const REFRESH_CHANNEL_CAPACITY: usize = 64;

/// Something happened that may have changed a user's role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleSignal {
    /// A role was changed for `user_id` on `event_id`.
    RoleUpdated {
        /// Event whose roles changed.
        event_id: String,
        /// User whose role changed.
        user_id: String,
    },
    /// Collaborators of an event changed (invitation answered or created,
    /// collaborator removed).
    CollaboratorUpdated {
        /// Event whose collaborators changed.
        event_id: String,
    },
    /// Row change from the `event_roles` realtime feed.
    AssignmentChanged(AssignmentChange),
    /// The user navigated to `path`.
    Navigated {
        /// Path or hash route.
        path: String,
    },
}

impl RoleSignal {
    /// Which kind of trigger this is.
    pub fn kind(&self) -> SignalKind {
        match self {
            Self::RoleUpdated { .. } => SignalKind::RoleUpdated,
            Self::CollaboratorUpdated { .. } => SignalKind::CollaboratorUpdated,
            Self::AssignmentChanged(_) => SignalKind::Realtime,
            Self::Navigated { .. } => SignalKind::Navigation,
        }
    }
}

/// Trigger kinds, reported with each refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// [`RoleSignal::RoleUpdated`]
    RoleUpdated,
    /// [`RoleSignal::CollaboratorUpdated`]
    CollaboratorUpdated,
    /// [`RoleSignal::AssignmentChanged`]
    Realtime,
    /// [`RoleSignal::Navigated`]
    Navigation,
}

/// A role was re-fetched because of a signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleRefreshed {
    /// Event whose role was refreshed.
    pub event_id: String,
    /// Newly resolved role.
    pub role: Role,
    /// What caused the refresh.
    pub trigger: SignalKind,
}

type RefreshCallback = Arc<dyn Fn(&RoleRefreshed) + Send + Sync>;

#[derive(Default)]
struct Observers {
    next_id: u64,
    by_event: HashMap<String, Vec<(u64, RefreshCallback)>>,
}

/// Per-event refresh callbacks plus a broadcast stream of every refresh.
pub struct RefreshNotifier {
    observers: Arc<Mutex<Observers>>,
    tx: broadcast::Sender<RoleRefreshed>,
}

impl Default for RefreshNotifier {
    fn default() -> Self {
        Self::new(REFRESH_CHANNEL_CAPACITY)
    }
}

impl RefreshNotifier {
    /// Create a notifier whose broadcast channel buffers `capacity` refreshes.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            observers: Arc::new(Mutex::new(Observers::default())),
            tx,
        }
    }

    /// Call `callback` after every refresh of `event_id`.
    ///
    /// The callback stays registered until the returned handle is dropped or
    /// [`RefreshSubscription::unsubscribe`] is called.
    pub fn on_refresh<F>(&self, event_id: &str, callback: F) -> RefreshSubscription
    where
        F: Fn(&RoleRefreshed) + Send + Sync + 'static,
    {
        let mut observers = lock(&self.observers);
        observers.next_id += 1;
        let id = observers.next_id;
        observers
            .by_event
            .entry(event_id.to_string())
            .or_default()
            .push((id, Arc::new(callback)));

        RefreshSubscription {
            id,
            event_id: event_id.to_string(),
            observers: Arc::downgrade(&self.observers),
        }
    }

    /// Stream of every refresh, across events.
    pub fn subscribe(&self) -> broadcast::Receiver<RoleRefreshed> {
        self.tx.subscribe()
    }

    /// Number of callbacks registered for an event.
    pub fn observer_count(&self, event_id: &str) -> usize {
        lock(&self.observers)
            .by_event
            .get(event_id)
            .map_or(0, Vec::len)
    }

    /// Deliver a refresh to the event's callbacks and to stream subscribers.
    pub fn notify(&self, refreshed: RoleRefreshed) {
        // Callbacks run outside the lock so they may (un)register observers.
        let callbacks: Vec<RefreshCallback> = lock(&self.observers)
            .by_event
            .get(&refreshed.event_id)
            .map(|list| list.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default();

        for callback in &callbacks {
            callback(&refreshed);
        }

        let receivers = self.tx.send(refreshed).unwrap_or(0);
        debug!(callbacks = callbacks.len(), receivers, "Role refresh delivered");
    }
}

/// Handle for a callback registered with [`RefreshNotifier::on_refresh`].
#[must_use = "dropping the subscription unregisters the callback"]
pub struct RefreshSubscription {
    id: u64,
    event_id: String,
    observers: Weak<Mutex<Observers>>,
}

impl RefreshSubscription {
    /// Event the callback watches.
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Unregister the callback.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for RefreshSubscription {
    fn drop(&mut self) {
        let Some(observers) = self.observers.upgrade() else {
            return;
        };
        let mut observers = lock(&observers);
        if let Some(list) = observers.by_event.get_mut(&self.event_id) {
            list.retain(|(id, _)| *id != self.id);
            if list.is_empty() {
                observers.by_event.remove(&self.event_id);
            }
        }
    }
}

fn lock(observers: &Mutex<Observers>) -> MutexGuard<'_, Observers> {
    observers.lock().unwrap_or_else(PoisonError::into_inner)
}
