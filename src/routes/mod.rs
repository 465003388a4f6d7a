use crate::models::AppState;
use axum::Router;

pub mod session_routes;
pub mod webhook_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/sessions", session_routes::router())
        .nest("/webhooks", webhook_routes::router())
        .with_state(state)
}
