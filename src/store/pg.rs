use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::{Profile, Role, RoleDataRow, RoleTable};

/// Postgres-backed store. Role-table queries interpolate the table name, but
/// only ever from a [`RoleTable`] descriptor, never from request input.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db) = e {
        if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) {
            return StoreError::Duplicate(db.message().to_string());
        }
    }
    StoreError::Query(e.to_string())
}

#[async_trait]
impl Store for PgStore {
    async fn profile_by_email(&self, email: &str) -> Result<Option<Profile>, StoreError> {
        sqlx::query_as::<_, Profile>(
            r#"
            SELECT id, email, role, created_at, updated_at
            FROM profiles
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)
    }

    async fn insert_profile(&self, id: Uuid, email: &str, role: Role) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO profiles (id, email, role)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn update_profile_role(&self, user_id: Uuid, role: Role) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE profiles
            SET role = $2,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(res.rows_affected() > 0)
    }

    async fn insert_role_row(&self, table: RoleTable, user_id: Uuid) -> Result<(), StoreError> {
        let sql = format!(
            r#"
            INSERT INTO {} (user_id)
            VALUES ($1)
            ON CONFLICT (user_id) DO NOTHING
            "#,
            table.name()
        );

        sqlx::query(&sql)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(())
    }

    async fn role_row(
        &self,
        table: RoleTable,
        user_id: Uuid,
    ) -> Result<Option<RoleDataRow>, StoreError> {
        let sql = format!(
            r#"
            SELECT user_id, data, updated_at
            FROM {}
            WHERE user_id = $1
            "#,
            table.name()
        );

        sqlx::query_as::<_, RoleDataRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)
    }

    async fn merge_role_row(
        &self,
        table: RoleTable,
        user_id: Uuid,
        patch: &Map<String, Value>,
    ) -> Result<bool, StoreError> {
        // jsonb || replaces top-level keys and keeps the rest.
        let sql = format!(
            r#"
            UPDATE {}
            SET data = data || $2,
                updated_at = now()
            WHERE user_id = $1
            "#,
            table.name()
        );

        let res = sqlx::query(&sql)
            .bind(user_id)
            .bind(Value::Object(patch.clone()))
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(res.rows_affected() > 0)
    }
}
