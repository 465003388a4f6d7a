// src/routes/webhook_routes.rs

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AppState, Role};
use crate::store::{Store, StoreError};

/// Event envelope pushed by the identity provider. Only the fields the
/// handler acts on are modeled; everything else in the payload is ignored,
/// and an absent `type` is handled like an unrecognized one.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub data: WebhookUser,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookUser {
    #[serde(default)]
    pub email_addresses: Vec<WebhookEmail>,
    #[serde(default)]
    pub primary_email_address_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEmail {
    pub id: String,
    pub email_address: String,
}

/// Failures with an external contract: the provider retries on 5xx and
/// drops the event on 4xx, so the split between them matters.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("No email address provided")]
    NoEmailProvided,
    #[error("No primary email found")]
    NoPrimaryEmail,
    #[error("Database query error")]
    DatabaseQueryError,
    #[error("Database insertion error")]
    DatabaseInsertionError,
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match self {
            WebhookError::NoEmailProvided | WebhookError::NoPrimaryEmail => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug)]
pub enum WebhookOutcome {
    Created,
    AlreadyExists,
    Ignored,
}

impl IntoResponse for WebhookOutcome {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            WebhookOutcome::Created => (StatusCode::CREATED, "User created successfully"),
            WebhookOutcome::AlreadyExists => (StatusCode::OK, "User already exists"),
            WebhookOutcome::Ignored => (StatusCode::OK, "Webhook processed"),
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        // /webhooks/identity
        .route("/identity", post(receive_event))
}

/// The body is parsed by hand so a payload that is not even JSON comes back
/// as a 500, not as the framework's 4xx rejection.
pub async fn receive_event(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<WebhookOutcome, WebhookError> {
    let event: WebhookEvent = serde_json::from_slice(&body).map_err(|e| {
        tracing::error!("webhook payload did not parse: {e}");
        WebhookError::Internal
    })?;

    process_event(state.store.as_ref(), event).await
}

async fn process_event(
    store: &dyn Store,
    event: WebhookEvent,
) -> Result<WebhookOutcome, WebhookError> {
    if !matches!(event.kind.as_str(), "user.created" | "user.updated") {
        tracing::debug!("ignoring webhook event type {:?}", event.kind);
        return Ok(WebhookOutcome::Ignored);
    }

    let user = event.data;
    if user.email_addresses.is_empty() {
        return Err(WebhookError::NoEmailProvided);
    }

    let primary_id = user.primary_email_address_id.as_deref();
    let Some(primary) = user
        .email_addresses
        .iter()
        .find(|entry| Some(entry.id.as_str()) == primary_id)
    else {
        return Err(WebhookError::NoPrimaryEmail);
    };
    let email = primary.email_address.as_str();

    let existing = store.profile_by_email(email).await.map_err(|e| {
        tracing::error!("webhook profile lookup failed for {email}: {e}");
        WebhookError::DatabaseQueryError
    })?;
    // user.updated events never rewrite an existing profile.
    if existing.is_some() {
        return Ok(WebhookOutcome::AlreadyExists);
    }

    let user_id = Uuid::new_v4();
    match store.insert_profile(user_id, email, Role::Patient).await {
        Ok(()) => {}
        // An interactive bootstrap got there first.
        Err(StoreError::Duplicate(_)) => return Ok(WebhookOutcome::AlreadyExists),
        Err(e) => {
            tracing::error!("webhook profile insert failed for {email}: {e}");
            return Err(WebhookError::DatabaseInsertionError);
        }
    }

    // Secondary insert is best effort; a missing row is recreated lazily on
    // the first session read.
    if let Err(e) = store.insert_role_row(Role::Patient.table(), user_id).await {
        tracing::warn!("webhook role row insert failed for {email}: {e}");
    }

    Ok(WebhookOutcome::Created)
}

/* -------------------- tests -------------------- */
