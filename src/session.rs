use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::models::{AuthState, Identity, Profile, Role, RoleData};
use crate::resolver::ProfileResolver;
use crate::roledata::RoleDataAccessor;
use crate::store::Store;

/* -------------------------
   Phases
--------------------------*/

/// Where a session currently stands. `Degraded` means the user is signed in
/// but no profile could be loaded; the session keeps empty role data and the
/// next auth event retries from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Unauthenticated,
    Bootstrapping,
    Ready,
    Degraded,
}

/* -------------------------
   Controller
--------------------------*/

/// Two copies of the role data: `confirmed` is what the store has
/// acknowledged, `current` is what callers see and may briefly run ahead of
/// it while a save is in flight. A failed save snaps `current` back.
#[derive(Default)]
struct Cache {
    confirmed: Option<RoleData>,
    current: Option<RoleData>,
}

/// Drives one user session from auth events to a loaded profile and role
/// data cache. Not internally synchronized; the registry wraps each
/// controller in a mutex so a session runs one logical operation at a time.
pub struct SessionController {
    resolver: ProfileResolver,
    accessor: RoleDataAccessor,
    phase: SessionPhase,
    email: Option<String>,
    profile: Option<Profile>,
    cache: Cache,
}

#[derive(Debug, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<RoleData>,
}

impl SessionController {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            resolver: ProfileResolver::new(store.clone()),
            accessor: RoleDataAccessor::new(store),
            phase: SessionPhase::Unauthenticated,
            email: None,
            profile: None,
            cache: Cache::default(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn data(&self) -> Option<&RoleData> {
        self.cache.current.as_ref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase(),
            profile: self.profile().cloned(),
            data: self.data().cloned(),
        }
    }

    /// Feed an auth event into the session. `Loading` defers everything,
    /// sign-out resets, and a sign-in bootstraps unless this exact email is
    /// already loaded.
    pub async fn handle_auth_change(&mut self, state: AuthState) {
        match state {
            AuthState::Loading => {
                tracing::debug!("auth still loading, deferring bootstrap");
            }
            AuthState::SignedOut => {
                self.reset(SessionPhase::Unauthenticated);
            }
            AuthState::SignedIn(identity) => {
                let Some(email) = identity.email().map(str::to_string) else {
                    tracing::warn!("signed-in identity carries no email");
                    self.reset(SessionPhase::Unauthenticated);
                    return;
                };

                if self.phase == SessionPhase::Ready
                    && self.email.as_deref() == Some(email.as_str())
                {
                    return;
                }

                self.phase = SessionPhase::Bootstrapping;
                self.email = Some(email.clone());
                self.bootstrap(&email, &identity).await;
            }
        }
    }

    /// Shallow-merge `updates` into the role data, optimistically in the
    /// cache and then in the store. Returns whether the store took the
    /// write; on `false` the cache is rolled back to the confirmed state.
    pub async fn save_changes(&mut self, updates: &Map<String, Value>) -> bool {
        let Some(profile) = self.profile.clone() else {
            tracing::debug!("save ignored: no active profile");
            return false;
        };

        let mut patch = updates.clone();
        // The stamp column is owned by the store, not by callers.
        patch.remove("updated_at");
        if patch.is_empty() {
            return true;
        }

        let confirmed = self.cache.confirmed.clone().unwrap_or_default();
        let stamp = self.next_stamp(&confirmed);
        let mut tentative = confirmed;
        tentative.merge(&patch, stamp);
        self.cache.current = Some(tentative);

        if self.accessor.write(profile.id, &profile.role, &patch).await {
            self.cache.confirmed = self.cache.current.clone();
            true
        } else {
            self.cache.current = self.cache.confirmed.clone();
            false
        }
    }

    /// Switch the profile to `role`. The profile row is updated first; only
    /// then does the session re-point its cache at the new role's data. The
    /// old role's row is left in place.
    pub async fn select_role(&mut self, role: Role) -> bool {
        let Some(profile) = self.profile.as_mut() else {
            tracing::debug!("role change ignored: no active profile");
            return false;
        };

        if profile.role == role.as_str() {
            return true;
        }

        if !self.resolver.set_role(profile.id, role).await {
            return false;
        }

        profile.role = role.as_str().to_string();
        let user_id = profile.id;

        self.accessor.ensure_row(user_id, role.as_str()).await;
        let data = self
            .accessor
            .read(user_id, role.as_str())
            .await
            .unwrap_or_default();
        self.cache.confirmed = Some(data.clone());
        self.cache.current = Some(data);
        true
    }

    fn reset(&mut self, phase: SessionPhase) {
        self.phase = phase;
        self.email = None;
        self.profile = None;
        self.cache = Cache::default();
    }

    async fn bootstrap(&mut self, email: &str, identity: &Identity) {
        if !self.resolver.exists(email).await {
            // Outcome deliberately ignored: the fetch below is authoritative,
            // and a lost creation race still leaves a row to fetch.
            let _ = self.resolver.create_profile(identity).await;
        }

        let Some(profile) = self.resolver.get_by_email(email).await else {
            // Still usable: empty role data, no profile, recoverable by a
            // fresh sign-in.
            tracing::error!("no profile available for {email} after bootstrap");
            self.profile = None;
            self.cache.confirmed = Some(RoleData::default());
            self.cache.current = Some(RoleData::default());
            self.phase = SessionPhase::Degraded;
            return;
        };

        let data = match self.accessor.read(profile.id, &profile.role).await {
            Some(data) => data,
            None => {
                if profile.role_table().is_some() {
                    self.accessor.ensure_row(profile.id, &profile.role).await;
                }
                RoleData::default()
            }
        };

        self.cache.confirmed = Some(data.clone());
        self.cache.current = Some(data);
        self.profile = Some(profile);
        self.phase = SessionPhase::Ready;
    }

    /// Next cache stamp. Wall clocks can stand still within a tick, so the
    /// stamp is bumped past the confirmed one when necessary to keep saves
    /// strictly ordered.
    fn next_stamp(&self, confirmed: &RoleData) -> DateTime<Utc> {
        let now = Utc::now();
        match confirmed.updated_at {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        }
    }
}

/* -------------------------
   Registry
--------------------------*/

/// All live sessions, keyed by an opaque id. Each controller sits behind
/// its own mutex, so distinct sessions proceed in parallel while a single
/// session's operations are serialized.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Arc<Mutex<SessionController>>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, controller: SessionController) -> Uuid {
        let id = Uuid::new_v4();
        self.inner
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(controller)));
        id
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Mutex<SessionController>>> {
        self.inner.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: Uuid) -> Option<Arc<Mutex<SessionController>>> {
        self.inner.write().await.remove(&id)
    }
}

/* -------------------- tests -------------------- */
