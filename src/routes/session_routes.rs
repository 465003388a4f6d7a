// src/routes/session_routes.rs

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{AppState, AuthState, Identity, Role},
    session::{SessionController, SessionSnapshot},
};

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub identity: Identity,
}

#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub data: SignInData,
}

#[derive(Debug, Serialize)]
pub struct SignInData {
    pub session_id: Uuid,
    pub session: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub data: SessionData,
}

#[derive(Debug, Serialize)]
pub struct SessionData {
    pub session: SessionSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    pub updates: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub data: SaveData,
}

#[derive(Debug, Serialize)]
pub struct SaveData {
    pub saved: bool,
    pub session: SessionSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct RoleChangeRequest {
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct RoleChangeResponse {
    pub data: RoleChangeData,
}

#[derive(Debug, Serialize)]
pub struct RoleChangeData {
    pub changed: bool,
    pub session: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub data: OkData,
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        // /api/v1/sessions
        .route("/", post(sign_in))
        // /api/v1/sessions/{session_id}
        .route("/{session_id}", get(get_session))
        // /api/v1/sessions/{session_id}/save
        .route("/{session_id}/save", post(save_changes))
        // /api/v1/sessions/{session_id}/role
        .route("/{session_id}/role", post(change_role))
        // /api/v1/sessions/{session_id}/signout
        .route("/{session_id}/signout", post(sign_out))
}

async fn load_session(
    state: &AppState,
    session_id: Uuid,
) -> Result<Arc<Mutex<SessionController>>, ApiError> {
    state
        .sessions
        .get(session_id)
        .await
        .ok_or_else(ApiError::session_not_found)
}

/// Open a session for a signed-in identity and run its bootstrap before
/// responding, so the caller immediately learns which phase it landed in.
pub async fn sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> Result<Json<SignInResponse>, ApiError> {
    let mut controller = SessionController::new(state.store.clone());
    controller
        .handle_auth_change(AuthState::SignedIn(req.identity))
        .await;

    let session = controller.snapshot();
    let session_id = state.sessions.insert(controller).await;

    Ok(Json(SignInResponse {
        data: SignInData {
            session_id,
            session,
        },
    }))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = load_session(&state, session_id).await?;
    let snapshot = session.lock().await.snapshot();

    Ok(Json(SessionResponse {
        data: SessionData { session: snapshot },
    }))
}

pub async fn save_changes(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<SaveRequest>,
) -> Result<Json<SaveResponse>, ApiError> {
    let session = load_session(&state, session_id).await?;
    let mut controller = session.lock().await;

    let saved = controller.save_changes(&req.updates).await;

    Ok(Json(SaveResponse {
        data: SaveData {
            saved,
            session: controller.snapshot(),
        },
    }))
}

pub async fn change_role(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<RoleChangeRequest>,
) -> Result<Json<RoleChangeResponse>, ApiError> {
    let role = Role::parse(req.role.trim()).ok_or_else(|| {
        ApiError::BadRequest("VALIDATION_ERROR", format!("unknown role: {}", req.role))
    })?;

    let session = load_session(&state, session_id).await?;
    let mut controller = session.lock().await;

    let changed = controller.select_role(role).await;

    Ok(Json(RoleChangeResponse {
        data: RoleChangeData {
            changed,
            session: controller.snapshot(),
        },
    }))
}

pub async fn sign_out(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    let session = state
        .sessions
        .remove(session_id)
        .await
        .ok_or_else(ApiError::session_not_found)?;
    session
        .lock()
        .await
        .handle_auth_change(AuthState::SignedOut)
        .await;

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}

/* -------------------- tests -------------------- */
