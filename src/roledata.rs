use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::{RoleData, RoleTable};
use crate::store::Store;

/// Reads and writes the per-role data tables. Role strings come from
/// `profiles.role` and are mapped through [`RoleTable`]; a string outside
/// the known set resolves to "no data" rather than an error.
#[derive(Clone)]
pub struct RoleDataAccessor {
    store: Arc<dyn Store>,
}

impl RoleDataAccessor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn read(&self, user_id: Uuid, role: &str) -> Option<RoleData> {
        let Some(table) = RoleTable::for_role_str(role) else {
            tracing::warn!("no role table mapped for role {role:?}");
            return None;
        };

        match self.store.role_row(table, user_id).await {
            Ok(row) => row.map(RoleData::from_row),
            Err(e) => {
                tracing::error!("role data read failed for {user_id}: {e}");
                None
            }
        }
    }

    /// Shallow-merge `patch` into the user's role row. Returns `false` when
    /// the role maps to no table, the row does not exist, or the store
    /// rejects the write; callers treat that as "nothing was persisted".
    pub async fn write(&self, user_id: Uuid, role: &str, patch: &Map<String, Value>) -> bool {
        let Some(table) = RoleTable::for_role_str(role) else {
            tracing::warn!("no role table mapped for role {role:?}");
            return false;
        };

        match self.store.merge_role_row(table, user_id, patch).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!("role data write matched no row for {user_id}");
                false
            }
            Err(e) => {
                tracing::error!("role data write failed for {user_id}: {e}");
                false
            }
        }
    }

    /// Make sure the user's role row exists, creating an empty one when it
    /// does not. Safe to repeat.
    pub async fn ensure_row(&self, user_id: Uuid, role: &str) -> bool {
        let Some(table) = RoleTable::for_role_str(role) else {
            tracing::warn!("no role table mapped for role {role:?}");
            return false;
        };

        match self.store.insert_role_row(table, user_id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("role row creation failed for {user_id}: {e}");
                false
            }
        }
    }
}

/* -------------------- tests -------------------- */
