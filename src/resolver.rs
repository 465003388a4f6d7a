use std::sync::Arc;

use uuid::Uuid;

use crate::models::{Identity, Profile, Role};
use crate::store::{Store, StoreError};

/// Looks up and creates profile rows keyed by email. Store failures are
/// logged and absorbed here: callers see `None`/`false` and decide how to
/// degrade, they never see a transport error.
#[derive(Clone)]
pub struct ProfileResolver {
    store: Arc<dyn Store>,
}

impl ProfileResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn exists(&self, email: &str) -> bool {
        match self.store.profile_by_email(email).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                tracing::warn!("profile existence check failed for {email}: {e}");
                false
            }
        }
    }

    /// Create a profile for a signed-in identity, defaulting to the patient
    /// role, plus its `patient_data` row. The second insert is best effort:
    /// the profile counts as created even if it fails, and a missing row is
    /// recreated lazily on the next bootstrap read. Losing a creation race
    /// is not an error either: the winner's row is looked up and its id
    /// returned.
    pub async fn create_profile(&self, identity: &Identity) -> Option<Uuid> {
        let Some(email) = identity.email() else {
            tracing::warn!("identity has no usable email, skipping profile creation");
            return None;
        };

        let id = Uuid::new_v4();
        match self.store.insert_profile(id, email, Role::Patient).await {
            Ok(()) => {
                if let Err(e) = self.store.insert_role_row(Role::Patient.table(), id).await {
                    tracing::warn!("patient data row insert failed for {email}: {e}");
                }
                Some(id)
            }
            Err(StoreError::Duplicate(_)) => {
                tracing::debug!("profile for {email} already exists");
                self.get_by_email(email).await.map(|p| p.id)
            }
            Err(e) => {
                tracing::error!("profile creation failed for {email}: {e}");
                None
            }
        }
    }

    pub async fn get_by_email(&self, email: &str) -> Option<Profile> {
        match self.store.profile_by_email(email).await {
            Ok(found) => found,
            Err(e) => {
                tracing::error!("profile lookup failed for {email}: {e}");
                None
            }
        }
    }

    pub async fn set_role(&self, user_id: Uuid, role: Role) -> bool {
        match self.store.update_profile_role(user_id, role).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!("role update matched no profile for {user_id}");
                false
            }
            Err(e) => {
                tracing::error!("role update failed for {user_id}: {e}");
                false
            }
        }
    }
}

/* -------------------- tests -------------------- */
