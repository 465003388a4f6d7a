//! Data store abstraction.
//!
//! The resolver, accessor, and routes all receive an explicitly constructed
//! store handle rather than reaching for a process-wide client, so tests can
//! substitute an in-memory store for the Postgres-backed [`PgStore`].

#[cfg(test)]
mod memory;
mod pg;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Profile, Role, RoleDataRow, RoleTable};

#[cfg(test)]
pub use memory::MemStore;
pub use pg::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique constraint rejected an insert. The profile-email constraint is
    /// the only backstop when two bootstrap paths race; callers must treat
    /// this as "already exists", not as a failure.
    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("query failed: {0}")]
    Query(String),
}

/// Point operations the scheduling service needs from its relational store:
/// single-row lookups by unique column, single-row inserts, and a shallow
/// partial update by `user_id`. Atomicity is per operation only.
#[async_trait]
pub trait Store: Send + Sync {
    async fn profile_by_email(&self, email: &str) -> Result<Option<Profile>, StoreError>;

    async fn insert_profile(&self, id: Uuid, email: &str, role: Role) -> Result<(), StoreError>;

    /// Returns `false` when no profile row matched.
    async fn update_profile_role(&self, user_id: Uuid, role: Role) -> Result<bool, StoreError>;

    /// Idempotent: inserting an already-present `user_id` is a no-op.
    async fn insert_role_row(&self, table: RoleTable, user_id: Uuid) -> Result<(), StoreError>;

    async fn role_row(
        &self,
        table: RoleTable,
        user_id: Uuid,
    ) -> Result<Option<RoleDataRow>, StoreError>;

    /// Shallow-merges `patch` into the row's data object and stamps the
    /// row's `updated_at`. Returns `false` when no row matched.
    async fn merge_role_row(
        &self,
        table: RoleTable,
        user_id: Uuid,
        patch: &Map<String, Value>,
    ) -> Result<bool, StoreError>;
}
