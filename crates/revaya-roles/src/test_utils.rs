// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory role store for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::RoleError;
use crate::persistence::{AssignmentStatus, EventOwnershipRecord, RoleAssignmentRecord, RoleStore};
use crate::role::Role;

/// Mock store with failure switches, query counters and scripted latency.
///
/// Assignment lookups read their row first and then sleep for the next
/// scripted delay, so a slow lookup returns the data as it was when it started.
#[derive(Default)]
pub struct MockRoleStore {
    events: Mutex<HashMap<String, EventOwnershipRecord>>,
    assignments: Mutex<HashMap<(String, String), RoleAssignmentRecord>>,
    delays: Mutex<VecDeque<Duration>>,
    fail_assignments: AtomicBool,
    fail_events: AtomicBool,
    assignment_queries: AtomicUsize,
    event_queries: AtomicUsize,
}

impl MockRoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event(&self, event_id: &str, owner_id: Option<&str>, created_by: Option<&str>) {
        self.events.lock().unwrap().insert(
            event_id.to_string(),
            EventOwnershipRecord {
                event_id: event_id.to_string(),
                owner_id: owner_id.map(String::from),
                created_by: created_by.map(String::from),
            },
        );
    }

    pub fn add_assignment(&self, event_id: &str, user_id: &str, role: &str, status: AssignmentStatus) {
        let now = Utc::now();
        self.assignments.lock().unwrap().insert(
            (event_id.to_string(), user_id.to_string()),
            RoleAssignmentRecord {
                id: format!("{}:{}", event_id, user_id),
                event_id: event_id.to_string(),
                user_id: user_id.to_string(),
                role: role.to_string(),
                status: status.as_str().to_string(),
                created_at: now,
                updated_at: now,
            },
        );
    }

    pub fn remove_assignment(&self, event_id: &str, user_id: &str) {
        self.assignments
            .lock()
            .unwrap()
            .remove(&(event_id.to_string(), user_id.to_string()));
    }

    /// Queue latencies for the next assignment lookups, in call order.
    pub fn push_delays(&self, delays: impl IntoIterator<Item = Duration>) {
        self.delays.lock().unwrap().extend(delays);
    }

    pub fn fail_assignments(&self, fail: bool) {
        self.fail_assignments.store(fail, Ordering::SeqCst);
    }

    pub fn fail_events(&self, fail: bool) {
        self.fail_events.store(fail, Ordering::SeqCst);
    }

    /// Number of assignment lookups, i.e. one per role fetch past the session check.
    pub fn assignment_queries(&self) -> usize {
        self.assignment_queries.load(Ordering::SeqCst)
    }

    /// Total lookups of either kind.
    pub fn query_count(&self) -> usize {
        self.assignment_queries() + self.event_queries.load(Ordering::SeqCst)
    }

    fn failure(operation: &str) -> RoleError {
        RoleError::DatabaseError {
            operation: operation.to_string(),
            details: "simulated failure".to_string(),
        }
    }
}

#[async_trait]
impl RoleStore for MockRoleStore {
    async fn find_active_assignment(
        &self,
        event_id: &str,
        user_id: &str,
    ) -> Result<Option<RoleAssignmentRecord>, RoleError> {
        self.assignment_queries.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail_assignments.load(Ordering::SeqCst) {
            Err(Self::failure("find_active_assignment"))
        } else {
            Ok(self
                .assignments
                .lock()
                .unwrap()
                .get(&(event_id.to_string(), user_id.to_string()))
                .filter(|r| r.status == "active")
                .cloned())
        };

        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn find_event_owner(
        &self,
        event_id: &str,
    ) -> Result<Option<EventOwnershipRecord>, RoleError> {
        self.event_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_events.load(Ordering::SeqCst) {
            return Err(Self::failure("find_event_owner"));
        }
        Ok(self.events.lock().unwrap().get(event_id).cloned())
    }

    async fn get_assignment(
        &self,
        event_id: &str,
        user_id: &str,
    ) -> Result<Option<RoleAssignmentRecord>, RoleError> {
        Ok(self
            .assignments
            .lock()
            .unwrap()
            .get(&(event_id.to_string(), user_id.to_string()))
            .cloned())
    }

    async fn upsert_assignment(
        &self,
        event_id: &str,
        user_id: &str,
        role: Role,
        status: AssignmentStatus,
    ) -> Result<RoleAssignmentRecord, RoleError> {
        self.add_assignment(event_id, user_id, role.as_str(), status);
        Ok(self
            .get_assignment(event_id, user_id)
            .await?
            .expect("just inserted"))
    }

    async fn set_assignment_status(
        &self,
        event_id: &str,
        user_id: &str,
        from: Option<AssignmentStatus>,
        to: AssignmentStatus,
    ) -> Result<bool, RoleError> {
        let mut assignments = self.assignments.lock().unwrap();
        match assignments.get_mut(&(event_id.to_string(), user_id.to_string())) {
            Some(record) if from.is_none_or(|f| record.status == f.as_str()) => {
                record.status = to.as_str().to_string();
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_active_assignments(
        &self,
        event_id: &str,
    ) -> Result<Vec<RoleAssignmentRecord>, RoleError> {
        let mut records: Vec<_> = self
            .assignments
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.event_id == event_id && r.status == "active")
            .cloned()
            .collect();
        records.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(records)
    }

    async fn save_event(
        &self,
        event_id: &str,
        owner_id: Option<&str>,
        created_by: Option<&str>,
    ) -> Result<(), RoleError> {
        self.add_event(event_id, owner_id, created_by);
        Ok(())
    }

    async fn health_check_db(&self) -> Result<bool, RoleError> {
        Ok(true)
    }
}
