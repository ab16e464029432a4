// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Time-bounded role cache keyed by user and event.
//!
//! # Entry lifecycle
//!
//! ```text
//!   ABSENT ──fetch──► FRESH ──ttl elapses──► STALE
//!     ▲                 ▲                      │
//!     │                 └──────refetch─────────┘
//!     └──────────────invalidate────────────────(any)
//! ```
//!
//! Staleness is detected lazily on read; there is no background sweep.
//!
//! # Users
//!
//! A role belongs to a (user, event) pair. Every read takes the session user
//! once and both looks up and fetches for that user, so switching users never
//! serves the previous user's role, and a fetch started for one user is only
//! ever stored under that user.
//!
//! # Concurrent fetches
//!
//! Every fetch gets a token. Only the fetch whose token is still registered
//! as in flight for its key may write the entry. Non-forced misses join the
//! in-flight fetch instead of starting another one; a forced refresh always
//! starts a new fetch and takes over the key, so an older fetch finishing
//! later is discarded. Invalidation unregisters the in-flight fetch, so it
//! cannot bring the entry back either.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::fetcher::RoleFetcher;
use crate::role::Role;

/// Options for [`RoleCache::get_role`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetRoleOptions {
    /// Skip the cache and always fetch.
    pub force: bool,
}

impl GetRoleOptions {
    /// Options with `force` set.
    pub fn forced() -> Self {
        Self { force: true }
    }
}

/// Where an event's entry is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    /// Never fetched, or invalidated.
    Absent,
    /// Younger than the TTL; served without fetching.
    Fresh,
    /// Older than the TTL; the next read fetches.
    Stale,
}

/// Debug view of one cache entry.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntrySnapshot {
    /// Event the entry belongs to.
    pub event_id: String,
    /// User the role was resolved for; `None` for an anonymous caller.
    pub user_id: Option<String>,
    /// Cached role.
    pub role: Role,
    /// Time since the role was fetched.
    pub age: Duration,
    /// Whether the entry is still within the TTL.
    pub fresh: bool,
    /// Wall-clock time of the fetch.
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    user_id: Option<String>,
    event_id: String,
}

struct CacheEntry {
    role: Role,
    fetched_at: Instant,
    fetched_at_utc: DateTime<Utc>,
}

impl CacheEntry {
    fn new(role: Role) -> Self {
        Self {
            role,
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

type SharedFetch = Shared<BoxFuture<'static, Role>>;

struct InFlight {
    token: u64,
    fetch: SharedFetch,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    in_flight: HashMap<CacheKey, InFlight>,
    last_known: HashMap<CacheKey, Role>,
    next_token: u64,
}

/// Per-user, per-event role cache in front of a [`RoleFetcher`].
pub struct RoleCache {
    fetcher: Arc<RoleFetcher>,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl RoleCache {
    /// Create a cache whose entries stay fresh for `ttl`.
    pub fn new(fetcher: Arc<RoleFetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The signed-in user's role for an event, from cache when fresh and not
    /// forced.
    pub async fn get_role(&self, event_id: &str, options: GetRoleOptions) -> Role {
        let key = self.key(event_id);

        let (token, fetch) = {
            let mut guard = self.lock();
            let state = &mut *guard;

            if !options.force {
                let cached = state
                    .entries
                    .get(&key)
                    .filter(|entry| entry.is_fresh(self.ttl))
                    .map(|entry| entry.role);
                if let Some(role) = cached {
                    state.last_known.insert(key, role);
                    return role;
                }
            }

            match state.in_flight.get(&key) {
                Some(in_flight) if !options.force => {
                    debug!(event_id, token = in_flight.token, "Joining in-flight role fetch");
                    (in_flight.token, in_flight.fetch.clone())
                }
                _ => self.start_fetch(state, &key),
            }
        };

        let role = fetch.await;
        self.complete(key, token, role);
        role
    }

    /// Fetch regardless of cache state.
    pub async fn force_refresh(&self, event_id: &str) -> Role {
        self.get_role(event_id, GetRoleOptions::forced()).await
    }

    /// Drop one event's entries, or every entry when `event_id` is `None`.
    ///
    /// Applies to all users. A fetch in flight for a dropped key still
    /// answers its callers but no longer writes to the cache. Per-event
    /// invalidation keeps the last-known roles; global invalidation clears
    /// them too.
    pub fn invalidate(&self, event_id: Option<&str>) {
        let mut state = self.lock();
        match event_id {
            Some(event_id) => {
                let entries = state.entries.len();
                let fetches = state.in_flight.len();
                state.entries.retain(|key, _| key.event_id != event_id);
                state.in_flight.retain(|key, _| key.event_id != event_id);
                debug!(
                    event_id,
                    entries = entries - state.entries.len(),
                    fetches = fetches - state.in_flight.len(),
                    "Invalidated cached role"
                );
            }
            None => {
                let entries = state.entries.len();
                state.entries.clear();
                state.in_flight.clear();
                state.last_known.clear();
                debug!(entries, "Cleared role cache");
            }
        }
    }

    /// Lifecycle state of the signed-in user's entry for an event.
    pub fn entry_state(&self, event_id: &str) -> EntryState {
        let key = self.key(event_id);
        match self.lock().entries.get(&key) {
            None => EntryState::Absent,
            Some(entry) if entry.is_fresh(self.ttl) => EntryState::Fresh,
            Some(_) => EntryState::Stale,
        }
    }

    /// Last role returned to the signed-in user for an event, regardless of age.
    pub fn last_known(&self, event_id: &str) -> Option<Role> {
        let key = self.key(event_id);
        self.lock().last_known.get(&key).copied()
    }

    /// Debug snapshot of every entry, sorted by event id then user.
    pub fn snapshot(&self) -> Vec<CacheEntrySnapshot> {
        let state = self.lock();
        let mut entries: Vec<_> = state
            .entries
            .iter()
            .map(|(key, entry)| CacheEntrySnapshot {
                event_id: key.event_id.clone(),
                user_id: key.user_id.clone(),
                role: entry.role,
                age: entry.fetched_at.elapsed(),
                fresh: entry.is_fresh(self.ttl),
                fetched_at: entry.fetched_at_utc,
            })
            .collect();
        entries.sort_by(|a, b| {
            a.event_id
                .cmp(&b.event_id)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        entries
    }

    /// Event ids with a fetch currently registered as in flight.
    pub fn in_flight(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .lock()
            .in_flight
            .keys()
            .map(|key| key.event_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    fn key(&self, event_id: &str) -> CacheKey {
        CacheKey {
            user_id: self.fetcher.current_user_id().filter(|id| !id.is_empty()),
            event_id: event_id.to_string(),
        }
    }

    fn start_fetch(&self, state: &mut CacheState, key: &CacheKey) -> (u64, SharedFetch) {
        state.next_token += 1;
        let token = state.next_token;

        let fetcher = self.fetcher.clone();
        let user_id = key.user_id.clone();
        let event_id = key.event_id.clone();
        let fetch = async move { fetcher.fetch_role_as(user_id.as_deref(), &event_id).await }
            .boxed()
            .shared();

        if let Some(previous) = state.in_flight.insert(
            key.clone(),
            InFlight {
                token,
                fetch: fetch.clone(),
            },
        ) {
            debug!(
                event_id = %key.event_id,
                superseded = previous.token,
                token,
                "Forced fetch supersedes in-flight fetch"
            );
        }

        (token, fetch)
    }

    fn complete(&self, key: CacheKey, token: u64, role: Role) {
        let mut guard = self.lock();
        let state = &mut *guard;

        let is_current = state
            .in_flight
            .get(&key)
            .is_some_and(|in_flight| in_flight.token == token);
        if !is_current {
            // Either already applied by another awaiter of the same fetch,
            // or superseded/invalidated while in flight.
            debug!(event_id = %key.event_id, token, role = %role, "Role fetch result not applied");
            return;
        }

        state.in_flight.remove(&key);
        state.entries.insert(key.clone(), CacheEntry::new(role));
        debug!(event_id = %key.event_id, token, role = %role, "Cached role");
        state.last_known.insert(key, role);
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
