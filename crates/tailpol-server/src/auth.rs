//! Request middleware: the capability gate and the debug state dump.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::error::ServerError;
use crate::state::AppState;

/// Reject the request unless the caller's grants allow it.
///
/// On success the [`tailpol_gate::Authorized`] decision is stored in the
/// request extensions for handlers that want the caller's identity.
pub async fn require_capability(
    State(app): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut req: Request,
    next: Next,
) -> Response {
    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();

    match app.authorizer.authorize(addr, &method, &path).await {
        Ok(authorized) => {
            req.extensions_mut().insert(authorized);
            next.run(req).await
        }
        Err(err) => ServerError::Denied(err).into_response(),
    }
}

fn is_mutation(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::DELETE)
}

/// With debug enabled, log the full document after each mutating request.
pub async fn dump_state(State(app): State<AppState>, req: Request, next: Next) -> Response {
    let mutation = is_mutation(req.method());
    let response = next.run(req).await;
    if app.debug && mutation {
        let state = String::from_utf8_lossy(&app.store.read()).into_owned();
        debug!(%state, "current state");
    }
    response
}
