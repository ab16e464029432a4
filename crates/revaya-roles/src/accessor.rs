// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Public role accessor.
//!
//! [`EventRoles`] is the one object the rest of the host talks to: it owns the
//! role cache, the refresh notifier and the set of events whose realtime
//! changes are relevant, and it turns [`RoleSignal`]s into forced refreshes.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::cache::{CacheEntrySnapshot, EntryState, GetRoleOptions, RoleCache};
use crate::fetcher::RoleFetcher;
use crate::persistence::RoleStore;
use crate::role::Role;
use crate::route::event_id_from_path;
use crate::session::SessionProvider;
use crate::signals::{RefreshNotifier, RefreshSubscription, RoleRefreshed, RoleSignal};

/// Debug view of the accessor state.
#[derive(Debug, Clone, Serialize)]
pub struct RolesSnapshot {
    /// Cache entry lifetime in seconds.
    pub ttl_secs: u64,
    /// Current session user.
    pub user_id: Option<String>,
    /// Cached entries, sorted by event id.
    pub entries: Vec<CacheEntrySnapshot>,
    /// Events whose realtime changes are followed.
    pub watched: Vec<String>,
    /// Events with a fetch in flight.
    pub in_flight: Vec<String>,
}

/// Event role lookups for the signed-in user.
pub struct EventRoles {
    cache: RoleCache,
    session: Arc<dyn SessionProvider>,
    notifier: RefreshNotifier,
    watched: Mutex<HashSet<String>>,
}

impl EventRoles {
    /// Create an accessor resolving roles from `store` for the user of `session`.
    pub fn new(
        store: Arc<dyn RoleStore>,
        session: Arc<dyn SessionProvider>,
        ttl: Duration,
    ) -> Self {
        let fetcher = Arc::new(RoleFetcher::new(store, session.clone()));
        Self {
            cache: RoleCache::new(fetcher, ttl),
            session,
            notifier: RefreshNotifier::default(),
            watched: Mutex::new(HashSet::new()),
        }
    }

    /// Role of the current user on `event_id`.
    ///
    /// Never fails: anything short of a positive match resolves to
    /// [`Role::Viewer`]. Starts following realtime changes for the event.
    pub async fn get_role(&self, event_id: &str, options: GetRoleOptions) -> Role {
        self.watch(event_id);
        self.cache.get_role(event_id, options).await
    }

    /// Whether the current user may edit `event_id`.
    pub async fn can_edit_event(&self, event_id: &str) -> bool {
        Self::can_edit(self.get_role(event_id, GetRoleOptions::default()).await)
    }

    /// Re-fetch the role for `event_id`, ignoring the cache.
    pub async fn force_refresh(&self, event_id: &str) -> Role {
        self.get_role(event_id, GetRoleOptions::forced()).await
    }

    /// Drop the cached role for one event, or for all events.
    ///
    /// Also stops following realtime changes for the dropped events.
    pub fn invalidate(&self, event_id: Option<&str>) {
        self.cache.invalidate(event_id);
        let mut watched = self.watched();
        match event_id {
            Some(event_id) => {
                watched.remove(event_id);
            }
            None => watched.clear(),
        }
    }

    /// Whether `role` grants edit rights.
    pub fn can_edit(role: Role) -> bool {
        role.can_edit()
    }

    /// Last role returned for `event_id`, even if its entry has expired.
    pub fn last_known(&self, event_id: &str) -> Option<Role> {
        self.cache.last_known(event_id)
    }

    /// Whether `event_id` has a fresh, stale or no cache entry.
    pub fn entry_state(&self, event_id: &str) -> EntryState {
        self.cache.entry_state(event_id)
    }

    /// Whether realtime changes for `event_id` are followed.
    pub fn is_watched(&self, event_id: &str) -> bool {
        self.watched().contains(event_id)
    }

    /// Debug view of cache, session and watches.
    pub fn snapshot(&self) -> RolesSnapshot {
        let mut watched: Vec<_> = self.watched().iter().cloned().collect();
        watched.sort();

        RolesSnapshot {
            ttl_secs: self.cache.ttl().as_secs(),
            user_id: self.session.current_user_id(),
            entries: self.cache.snapshot(),
            watched,
            in_flight: self.cache.in_flight(),
        }
    }

    /// Call `callback` after every signal-driven refresh of `event_id`.
    pub fn on_refresh<F>(&self, event_id: &str, callback: F) -> RefreshSubscription
    where
        F: Fn(&RoleRefreshed) + Send + Sync + 'static,
    {
        self.notifier.on_refresh(event_id, callback)
    }

    /// Stream of every signal-driven refresh.
    pub fn subscribe(&self) -> broadcast::Receiver<RoleRefreshed> {
        self.notifier.subscribe()
    }

    /// Clear every cached role and end the session.
    pub fn logout(&self) {
        self.session.sign_out();
        self.invalidate(None);
        info!("Signed out, role cache cleared");
    }

    /// React to something that may have changed the user's role.
    ///
    /// Returns the refreshed role, or `None` when the signal does not concern
    /// the current user (another user's change, an unwatched event, a
    /// non-event page).
    pub async fn handle_signal(&self, signal: RoleSignal) -> Option<Role> {
        let trigger = signal.kind();
        let event_id = match signal {
            RoleSignal::RoleUpdated { event_id, user_id } => {
                if !self.is_current_user(&user_id) {
                    debug!(%event_id, %user_id, "Ignoring role update for another user");
                    return None;
                }
                event_id
            }
            RoleSignal::CollaboratorUpdated { event_id } => event_id,
            RoleSignal::AssignmentChanged(change) => {
                if !self.is_watched(&change.event_id) {
                    debug!(event_id = %change.event_id, "Ignoring change for unwatched event");
                    return None;
                }
                if !self.is_current_user(&change.user_id) {
                    debug!(
                        event_id = %change.event_id,
                        user_id = %change.user_id,
                        "Ignoring change for another user"
                    );
                    return None;
                }
                change.event_id
            }
            RoleSignal::Navigated { path } => match event_id_from_path(&path) {
                Some(event_id) => event_id,
                None => return None,
            },
        };

        let role = self.force_refresh(&event_id).await;
        debug!(%event_id, role = %role, ?trigger, "Role refreshed by signal");

        self.notifier.notify(RoleRefreshed {
            event_id,
            role,
            trigger,
        });
        Some(role)
    }

    fn is_current_user(&self, user_id: &str) -> bool {
        self.session
            .current_user_id()
            .is_some_and(|current| current == user_id)
    }

    fn watch(&self, event_id: &str) {
        if !event_id.is_empty() {
            self.watched().insert(event_id.to_string());
        }
    }

    fn watched(&self) -> MutexGuard<'_, HashSet<String>> {
        self.watched.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::AssignmentStatus;
    use crate::realtime::{AssignmentChange, ChangeOp};
    use crate::session::Session;
    use crate::test_utils::MockRoleStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(30);

    fn setup(user: &str) -> (Arc<MockRoleStore>, Arc<Session>, EventRoles) {
        let store = Arc::new(MockRoleStore::new());
        let session = Arc::new(Session::signed_in(user));
        let roles = EventRoles::new(store.clone(), session.clone(), TTL);
        (store, session, roles)
    }

    fn change(event_id: &str, user_id: &str) -> RoleSignal {
        RoleSignal::AssignmentChanged(AssignmentChange {
            op: ChangeOp::Update,
            event_id: event_id.to_string(),
            user_id: user_id.to_string(),
            role: Some("editor".to_string()),
            status: Some("active".to_string()),
        })
    }

    #[tokio::test]
    async fn test_owner_without_assignment_is_admin() {
        let (store, _session, roles) = setup("u");
        store.add_event("e", Some("u"), None);

        assert_eq!(roles.get_role("e", GetRoleOptions::default()).await, Role::Admin);
        assert!(roles.can_edit_event("e").await);
    }

    #[tokio::test]
    async fn test_active_assignment_for_non_owner() {
        let (store, _session, roles) = setup("u");
        store.add_event("e", Some("someone-else"), None);
        store.add_assignment("e", "u", "editor", AssignmentStatus::Active);

        assert_eq!(roles.get_role("e", GetRoleOptions::default()).await, Role::Editor);
    }

    #[tokio::test]
    async fn test_pending_assignment_is_ignored() {
        let (store, _session, roles) = setup("u");
        store.add_event("e", Some("someone-else"), None);
        store.add_assignment("e", "u", "editor", AssignmentStatus::Pending);

        assert_eq!(roles.get_role("e", GetRoleOptions::default()).await, Role::Viewer);
        assert!(!roles.can_edit_event("e").await);
    }

    #[tokio::test]
    async fn test_collaborator_signal_refreshes_cached_role() {
        let (store, _session, roles) = setup("u");
        store.add_event("e", Some("someone-else"), None);

        assert_eq!(roles.get_role("e", GetRoleOptions::default()).await, Role::Viewer);

        store.add_assignment("e", "u", "editor", AssignmentStatus::Active);
        let refreshed = roles
            .handle_signal(RoleSignal::CollaboratorUpdated {
                event_id: "e".to_string(),
            })
            .await;
        assert_eq!(refreshed, Some(Role::Editor));

        let queries = store.assignment_queries();
        assert_eq!(roles.get_role("e", GetRoleOptions::default()).await, Role::Editor);
        assert_eq!(store.assignment_queries(), queries);
    }

    #[tokio::test]
    async fn test_role_update_for_other_user_is_ignored() {
        let (store, _session, roles) = setup("u");
        store.add_event("e", None, None);

        let result = roles
            .handle_signal(RoleSignal::RoleUpdated {
                event_id: "e".to_string(),
                user_id: "other".to_string(),
            })
            .await;

        assert_eq!(result, None);
        assert_eq!(store.query_count(), 0);

        let result = roles
            .handle_signal(RoleSignal::RoleUpdated {
                event_id: "e".to_string(),
                user_id: "u".to_string(),
            })
            .await;
        assert_eq!(result, Some(Role::Viewer));
    }

    #[tokio::test]
    async fn test_realtime_change_requires_watch_and_current_user() {
        let (store, _session, roles) = setup("u");
        store.add_event("e", None, None);

        assert_eq!(roles.handle_signal(change("e", "u")).await, None);
        assert_eq!(store.query_count(), 0);

        roles.get_role("e", GetRoleOptions::default()).await;
        assert!(roles.is_watched("e"));
        let before = store.assignment_queries();

        assert_eq!(roles.handle_signal(change("e", "other")).await, None);
        assert_eq!(store.assignment_queries(), before);

        store.add_assignment("e", "u", "editor", AssignmentStatus::Active);
        assert_eq!(roles.handle_signal(change("e", "u")).await, Some(Role::Editor));
        assert_eq!(store.assignment_queries(), before + 1);
    }

    #[tokio::test]
    async fn test_invalidate_releases_watch() {
        let (store, _session, roles) = setup("u");
        store.add_event("e", None, None);

        roles.get_role("e", GetRoleOptions::default()).await;
        roles.invalidate(Some("e"));
        assert!(!roles.is_watched("e"));
        assert_eq!(roles.handle_signal(change("e", "u")).await, None);
    }

    #[tokio::test]
    async fn test_navigation() {
        let (store, _session, roles) = setup("u");
        store.add_event("abc", Some("u"), None);

        let result = roles
            .handle_signal(RoleSignal::Navigated {
                path: "#/dashboard".to_string(),
            })
            .await;
        assert_eq!(result, None);
        assert_eq!(store.query_count(), 0);

        let result = roles
            .handle_signal(RoleSignal::Navigated {
                path: "#/events/abc/tasks".to_string(),
            })
            .await;
        assert_eq!(result, Some(Role::Admin));
    }

    #[tokio::test]
    async fn test_refresh_observers_notified() {
        let (store, _session, roles) = setup("u");
        store.add_event("e", Some("u"), None);

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let _sub = roles.on_refresh("e", move |refreshed| {
            assert_eq!(refreshed.role, Role::Admin);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut rx = roles.subscribe();

        roles
            .handle_signal(RoleSignal::CollaboratorUpdated {
                event_id: "e".to_string(),
            })
            .await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_id, "e");
        assert_eq!(received.trigger, crate::signals::SignalKind::CollaboratorUpdated);
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let (store, session, roles) = setup("u");
        store.add_event("e", Some("u"), None);

        roles.get_role("e", GetRoleOptions::default()).await;
        assert_eq!(roles.last_known("e"), Some(Role::Admin));

        roles.logout();

        assert_eq!(session.current_user_id(), None);
        assert_eq!(roles.last_known("e"), None);
        assert!(!roles.is_watched("e"));
        assert_eq!(roles.get_role("e", GetRoleOptions::default()).await, Role::Viewer);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_in_flight_during_logout_is_not_kept() {
        let (store, _session, roles) = setup("u");
        store.add_event("e", Some("u"), None);
        store.push_delays([Duration::from_millis(50)]);

        let (role, ()) = tokio::join!(roles.get_role("e", GetRoleOptions::default()), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            roles.logout();
        });

        assert_eq!(role, Role::Admin);
        assert!(roles.snapshot().entries.is_empty());
        assert_eq!(roles.last_known("e"), None);
        assert_eq!(roles.get_role("e", GetRoleOptions::default()).await, Role::Viewer);
    }

    #[tokio::test]
    async fn test_user_switch_resolves_for_new_user() {
        let (store, session, roles) = setup("owner");
        store.add_event("e", Some("owner"), None);

        assert_eq!(roles.get_role("e", GetRoleOptions::default()).await, Role::Admin);

        session.sign_in("guest");
        assert_eq!(roles.get_role("e", GetRoleOptions::default()).await, Role::Viewer);
        assert!(!roles.can_edit_event("e").await);
    }

    #[tokio::test]
    async fn test_revoked_assignment_refreshes_to_viewer() {
        let (store, _session, roles) = setup("u");
        store.add_event("e", Some("someone-else"), None);
        store.add_assignment("e", "u", "editor", AssignmentStatus::Active);

        assert_eq!(roles.get_role("e", GetRoleOptions::default()).await, Role::Editor);

        store.remove_assignment("e", "u");
        let refreshed = roles
            .handle_signal(RoleSignal::RoleUpdated {
                event_id: "e".to_string(),
                user_id: "u".to_string(),
            })
            .await;

        assert_eq!(refreshed, Some(Role::Viewer));
        assert_eq!(roles.last_known("e"), Some(Role::Viewer));
    }

    #[tokio::test]
    async fn test_snapshot() {
        let (store, _session, roles) = setup("u");
        store.add_event("b", Some("u"), None);
        store.add_event("a", None, None);

        roles.get_role("b", GetRoleOptions::default()).await;
        roles.get_role("a", GetRoleOptions::default()).await;

        let snapshot = roles.snapshot();
        assert_eq!(snapshot.ttl_secs, 30);
        assert_eq!(snapshot.user_id.as_deref(), Some("u"));
        assert_eq!(snapshot.watched, vec!["a", "b"]);
        assert_eq!(snapshot.entries.len(), 2);
        assert_eq!(snapshot.entries[0].event_id, "a");
        assert!(snapshot.in_flight.is_empty());
    }

    #[test]
    fn test_can_edit_predicate() {
        assert!(EventRoles::can_edit(Role::Admin));
        assert!(EventRoles::can_edit(Role::Editor));
        assert!(!EventRoles::can_edit(Role::Viewer));
    }
}
