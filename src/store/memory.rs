use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::{Profile, Role, RoleDataRow, RoleTable};

/// In-memory store the test suites run against, with the same duplicate
/// and merge semantics as Postgres. Faults can be armed to make individual
/// operations fail, so callers' degraded paths can be exercised
/// deterministically.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    profiles: HashMap<Uuid, Profile>,
    role_rows: HashMap<(&'static str, Uuid), RoleDataRow>,
    faults: Faults,
}

#[derive(Default)]
struct Faults {
    // None = never fail; Some(n) = allow n more successful lookups, then fail.
    profile_lookup_budget: Option<u32>,
    profile_lookup_miss: bool,
    profile_insert: bool,
    profile_role_update: bool,
    role_row_insert: bool,
    role_row_read: bool,
    role_row_write: bool,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /* ---- fault switches ---- */

    pub fn fail_profile_lookups(&self) {
        self.lock().faults.profile_lookup_budget = Some(0);
    }

    /// Let the next `n` lookups succeed, then fail every one after that.
    pub fn fail_profile_lookups_after(&self, n: u32) {
        self.lock().faults.profile_lookup_budget = Some(n);
    }

    /// Make profile lookups report no match even when a row exists, as when
    /// a concurrent writer lands its insert between a caller's lookup and
    /// the insert that follows it.
    pub fn miss_profile_lookups(&self) {
        self.lock().faults.profile_lookup_miss = true;
    }

    pub fn fail_profile_inserts(&self) {
        self.lock().faults.profile_insert = true;
    }

    pub fn fail_profile_role_updates(&self) {
        self.lock().faults.profile_role_update = true;
    }

    pub fn fail_role_row_inserts(&self) {
        self.lock().faults.role_row_insert = true;
    }

    pub fn fail_role_row_reads(&self) {
        self.lock().faults.role_row_read = true;
    }

    pub fn fail_role_row_writes(&self) {
        self.lock().faults.role_row_write = true;
    }

    pub fn clear_faults(&self) {
        self.lock().faults = Faults::default();
    }

    /* ---- seeding and inspection ---- */

    /// Insert a profile row directly, bypassing the trait. Accepts any role
    /// string so rows written by other services (or older deployments) can
    /// be represented.
    pub fn seed_profile(&self, email: &str, role: &str) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.lock().profiles.insert(
            id,
            Profile {
                id,
                email: email.to_string(),
                role: role.to_string(),
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub fn seed_role_row(&self, table: RoleTable, user_id: Uuid, data: Value) {
        self.lock().role_rows.insert(
            (table.name(), user_id),
            RoleDataRow {
                user_id,
                data,
                updated_at: Utc::now(),
            },
        );
    }

    pub fn profile_count(&self) -> usize {
        self.lock().profiles.len()
    }

    pub fn profile_role(&self, user_id: Uuid) -> Option<String> {
        self.lock().profiles.get(&user_id).map(|p| p.role.clone())
    }

    pub fn role_row_exists(&self, table: RoleTable, user_id: Uuid) -> bool {
        self.lock().role_rows.contains_key(&(table.name(), user_id))
    }

    pub fn role_row_data(&self, table: RoleTable, user_id: Uuid) -> Option<Value> {
        self.lock()
            .role_rows
            .get(&(table.name(), user_id))
            .map(|row| row.data.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl Store for MemStore {
    async fn profile_by_email(&self, email: &str) -> Result<Option<Profile>, StoreError> {
        let mut inner = self.lock();
        if let Some(budget) = inner.faults.profile_lookup_budget {
            if budget == 0 {
                return Err(StoreError::Query("injected: profile lookup".into()));
            }
            inner.faults.profile_lookup_budget = Some(budget - 1);
        }
        if inner.faults.profile_lookup_miss {
            return Ok(None);
        }
        Ok(inner.profiles.values().find(|p| p.email == email).cloned())
    }

    async fn insert_profile(&self, id: Uuid, email: &str, role: Role) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.faults.profile_insert {
            return Err(StoreError::Query("injected: profile insert".into()));
        }
        if inner.profiles.values().any(|p| p.email == email) {
            return Err(StoreError::Duplicate(format!(
                "profiles_email_key: {email}"
            )));
        }
        let now = Utc::now();
        inner.profiles.insert(
            id,
            Profile {
                id,
                email: email.to_string(),
                role: role.as_str().to_string(),
                created_at: now,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn update_profile_role(&self, user_id: Uuid, role: Role) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        if inner.faults.profile_role_update {
            return Err(StoreError::Query("injected: profile role update".into()));
        }
        match inner.profiles.get_mut(&user_id) {
            Some(profile) => {
                profile.role = role.as_str().to_string();
                profile.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_role_row(&self, table: RoleTable, user_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.faults.role_row_insert {
            return Err(StoreError::Query("injected: role row insert".into()));
        }
        inner
            .role_rows
            .entry((table.name(), user_id))
            .or_insert_with(|| RoleDataRow {
                user_id,
                data: Value::Object(Map::new()),
                updated_at: Utc::now(),
            });
        Ok(())
    }

    async fn role_row(
        &self,
        table: RoleTable,
        user_id: Uuid,
    ) -> Result<Option<RoleDataRow>, StoreError> {
        let inner = self.lock();
        if inner.faults.role_row_read {
            return Err(StoreError::Query("injected: role row read".into()));
        }
        Ok(inner.role_rows.get(&(table.name(), user_id)).cloned())
    }

    async fn merge_role_row(
        &self,
        table: RoleTable,
        user_id: Uuid,
        patch: &Map<String, Value>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        if inner.faults.role_row_write {
            return Err(StoreError::Query("injected: role row write".into()));
        }
        match inner.role_rows.get_mut(&(table.name(), user_id)) {
            Some(row) => {
                if let Value::Object(map) = &mut row.data {
                    for (key, value) in patch {
                        map.insert(key.clone(), value.clone());
                    }
                }
                row.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/* -------------------- tests -------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn second_insert_for_same_email_is_a_duplicate() {
        let store = MemStore::new();
        store
            .insert_profile(Uuid::new_v4(), "a@b.c", Role::Patient)
            .await
            .unwrap();

        let err = store
            .insert_profile(Uuid::new_v4(), "a@b.c", Role::Patient)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert_eq!(store.profile_count(), 1);
    }

    #[tokio::test]
    async fn role_row_insert_is_idempotent_and_keeps_data() {
        let store = MemStore::new();
        let user_id = Uuid::new_v4();
        let table = Role::Patient.table();

        store.insert_role_row(table, user_id).await.unwrap();
        store
            .merge_role_row(table, user_id, json!({"k": 1}).as_object().unwrap())
            .await
            .unwrap();
        store.insert_role_row(table, user_id).await.unwrap();

        let row = store.role_row(table, user_id).await.unwrap().unwrap();
        assert_eq!(row.data, json!({"k": 1}));
    }

    #[tokio::test]
    async fn merge_without_row_reports_no_match() {
        let store = MemStore::new();
        let matched = store
            .merge_role_row(
                Role::Staff.table(),
                Uuid::new_v4(),
                json!({"k": 1}).as_object().unwrap(),
            )
            .await
            .unwrap();
        assert!(!matched);
    }

    #[tokio::test]
    async fn merge_replaces_top_level_keys_wholesale() {
        let store = MemStore::new();
        let user_id = Uuid::new_v4();
        let table = Role::Patient.table();
        store.seed_role_row(table, user_id, json!({"preferences": {"a": 1, "b": 2}, "name": "x"}));

        store
            .merge_role_row(
                table,
                user_id,
                json!({"preferences": {"b": 3}}).as_object().unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            store.role_row_data(table, user_id).unwrap(),
            json!({"preferences": {"b": 3}, "name": "x"})
        );
    }

    #[tokio::test]
    async fn lookup_budget_allows_then_fails() {
        let store = MemStore::new();
        store.seed_profile("a@b.c", "patient");
        store.fail_profile_lookups_after(1);

        assert!(store.profile_by_email("a@b.c").await.unwrap().is_some());
        assert!(store.profile_by_email("a@b.c").await.is_err());
    }

    #[tokio::test]
    async fn missed_lookups_still_conflict_on_insert() {
        let store = MemStore::new();
        store.seed_profile("a@b.c", "patient");
        store.miss_profile_lookups();

        assert!(store.profile_by_email("a@b.c").await.unwrap().is_none());
        let err = store
            .insert_profile(Uuid::new_v4(), "a@b.c", Role::Patient)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }
}
