use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use uuid::Uuid;

use crate::session::SessionRegistry;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            sessions: SessionRegistry::new(),
        }
    }
}

/* -------------------------
   Roles
--------------------------*/

/// The three roles the system knows. Stored lowercase in `profiles.role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Staff,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "patient" => Some(Role::Patient),
            "staff" => Some(Role::Staff),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub const fn table(self) -> RoleTable {
        match self {
            Role::Patient => RoleTable("patient_data"),
            Role::Staff => RoleTable("staff_data"),
            Role::Admin => RoleTable("admin_data"),
        }
    }
}

/// Descriptor for a role-specific data table. Only constructible through
/// [`Role::table`], so a query can never be aimed at a table name that was
/// assembled from an unvalidated role string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleTable(&'static str);

impl RoleTable {
    pub const fn name(self) -> &'static str {
        self.0
    }

    /// Table for a raw role string as stored in the DB. `None` for anything
    /// outside the closed role set; callers treat that as "no role data
    /// available", not as an error.
    pub fn for_role_str(role: &str) -> Option<RoleTable> {
        Role::parse(role).map(Role::table)
    }
}

/* -------------------------
   DB row models
--------------------------*/

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    /// Kept as the raw stored string: a profile with an out-of-set role must
    /// still load; its role data simply resolves to "none available".
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn role_table(&self) -> Option<RoleTable> {
        RoleTable::for_role_str(&self.role)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RoleDataRow {
    pub user_id: Uuid,
    pub data: Value,
    pub updated_at: DateTime<Utc>,
}

/* -------------------------
   Role data payload
--------------------------*/

/// The open-ended payload of a role table row: top-level application fields
/// (`appointments`, `preferences`, ...) plus the row's `updated_at`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleData {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RoleData {
    pub fn from_row(row: RoleDataRow) -> Self {
        let fields = match row.data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            fields,
            updated_at: Some(row.updated_at),
        }
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[allow(dead_code)]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Shallow merge: last write wins per top-level key. `updated_at` is a
    /// reserved column name and never lands among the fields.
    pub fn merge(&mut self, patch: &Map<String, Value>, stamp: DateTime<Utc>) {
        for (key, value) in patch {
            if key == "updated_at" {
                continue;
            }
            self.fields.insert(key.clone(), value.clone());
        }
        self.updated_at = Some(stamp);
    }

    /// Decode `fields.appointments` leniently: entries that don't parse are
    /// dropped rather than failing the whole list.
    #[allow(dead_code)]
    pub fn appointments(&self) -> Vec<Appointment> {
        self.fields
            .get("appointments")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[allow(dead_code)]
    pub fn preferences(&self) -> Map<String, Value> {
        self.fields
            .get("preferences")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }
}

/* -------------------------
   Appointments
--------------------------*/

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

/// One appointment inside a patient's `appointments` list. Dates and
/// statuses are taken as stored; a `scheduled` appointment with a past date
/// is not auto-transitioned.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub department: String,
    pub doctor: String,
    pub date: NaiveDate,
    pub time: String,
    pub status: AppointmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/* -------------------------
   Identity provider types
--------------------------*/

/// Settled identity snapshot delivered by the external identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_email_address: Option<IdentityEmail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityEmail {
    pub email_address: String,
}

impl Identity {
    #[cfg(test)]
    pub fn with_email(email: &str) -> Self {
        Self {
            primary_email_address: Some(IdentityEmail {
                email_address: email.to_string(),
            }),
            full_name: None,
        }
    }

    /// The verified primary email, if the provider supplied one. An empty
    /// string counts as missing.
    pub fn email(&self) -> Option<&str> {
        self.primary_email_address
            .as_ref()
            .map(|p| p.email_address.as_str())
            .filter(|e| !e.is_empty())
    }
}

/// The identity provider's load-completion signal: bootstrapping must not
/// start while the state is still `Loading`.
#[derive(Debug, Clone)]
pub enum AuthState {
    #[allow(dead_code)]
    Loading,
    SignedOut,
    SignedIn(Identity),
}
