// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared setup for revaya-roles integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;

use revaya_roles::accessor::EventRoles;
use revaya_roles::collaborators::CollaboratorDirectory;
use revaya_roles::migrations;
use revaya_roles::persistence::{PostgresRoleStore, RoleStore, SqliteRoleStore};
use revaya_roles::session::Session;

/// Helper macro to skip tests if database URL is not set.
#[allow(unused_macros)]
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        }
    };
}

pub const TTL: Duration = Duration::from_secs(30);

/// Store, session, accessor and directory wired together.
pub struct TestContext<S> {
    pub store: Arc<S>,
    pub session: Arc<Session>,
    pub roles: Arc<EventRoles>,
    pub directory: CollaboratorDirectory,
}

impl<S: RoleStore + 'static> TestContext<S> {
    pub fn with_store(store: Arc<S>, user_id: &str) -> Self {
        let session = Arc::new(Session::signed_in(user_id));
        let roles = Arc::new(EventRoles::new(store.clone(), session.clone(), TTL));
        let directory = CollaboratorDirectory::new(store.clone(), roles.clone());
        Self {
            store,
            session,
            roles,
            directory,
        }
    }
}

/// Context over a private in-memory SQLite database.
pub async fn sqlite_context(user_id: &str) -> TestContext<SqliteRoleStore> {
    let store = SqliteRoleStore::in_memory()
        .await
        .expect("in-memory sqlite store");
    TestContext::with_store(Arc::new(store), user_id)
}

/// Migrated pool from TEST_DATABASE_URL, if set and reachable.
pub async fn get_test_pool() -> Option<PgPool> {
    let database_url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = PgPool::connect(&database_url).await.ok()?;
    migrations::run_postgres(&pool).await.ok()?;
    Some(pool)
}

/// Context over the test Postgres database.
pub fn postgres_context(pool: PgPool, user_id: &str) -> TestContext<PostgresRoleStore> {
    TestContext::with_store(Arc::new(PostgresRoleStore::new(pool)), user_id)
}

/// Random id so concurrent test runs don't collide.
pub fn unique_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}
