use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::{dump_state, require_capability};
use crate::handler;
use crate::resources;
use crate::state::AppState;

/// Build the axum router with all tailpol endpoints.
///
/// Every route, including unknown paths, passes the capability gate first.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/state", get(handler::state_handler))
        .route("/healthz", get(handler::health_handler))
        .merge(resources::routes())
        .layer(middleware::from_fn_with_state(state.clone(), dump_state))
        .layer(middleware::from_fn_with_state(state.clone(), require_capability))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
