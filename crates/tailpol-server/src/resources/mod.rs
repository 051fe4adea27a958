//! REST resources, one per policy document collection.
//!
//! Each handler reads its collection with [`DocumentStore::get_as`], edits the
//! decoded value and writes the whole collection back. Collections come in
//! four shapes:
//!
//! - id-addressed list: [`acls`]
//! - name-keyed maps: [`named`] (groups, tag owners, hosts, postures)
//! - index-addressed lists: [`indexed`] (ssh rules, ACL tests, node attributes)
//! - single documents: [`singleton`] (settings, auto approvers, DERP map)

use axum::extract::rejection::JsonRejection;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tailpol_store::DocumentStore;
use tracing::error;

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

pub mod acls;
pub mod indexed;
pub mod named;
pub mod singleton;

/// Routes for every collection.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(acls::routes())
        .merge(named::routes())
        .merge(indexed::routes())
        .merge(singleton::routes())
}

/// Unwrap a JSON body, turning extractor rejections into 400s with a JSON body.
pub(crate) fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> ServerResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ServerError::BadRequest(rejection.body_text()))
}

/// Write a collection back.
///
/// A persistence fault leaves the change in memory and is only logged; the
/// request still succeeds.
pub(crate) async fn commit<T: Serialize>(store: &DocumentStore, key: &str, value: &T) -> ServerResult<()> {
    tolerate_persistence(key, store.update_and_persist_as(key, value).await)
}

/// Remove a collection from the document.
pub(crate) async fn remove(store: &DocumentStore, key: &str) -> ServerResult<()> {
    tolerate_persistence(key, store.update_and_persist(key, Value::Null).await)
}

fn tolerate_persistence(key: &str, result: tailpol_store::StoreResult<()>) -> ServerResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_persistence() => {
            error!(collection = key, error = %e, "change applied in memory but not persisted");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// `{"message": text}`
pub(crate) fn message(text: impl Into<String>) -> Json<Value> {
    Json(json!({ "message": text.into() }))
}
