use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use crate::state::AppState;

/// Health check handler.
pub async fn health_handler() -> &'static str {
    "OK"
}

/// The whole document as pretty JSON.
pub async fn state_handler(State(app): State<AppState>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], app.store.read())
}
