//! `/acls`: access rules addressed by a stable generated id.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{commit, message, parse_body};
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

const KEY: &str = "acls";

/// One access rule as it appears in the policy file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRule {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub src: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dst: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub proto: String,
    #[serde(default, rename = "srcPosture", skip_serializing_if = "Vec::is_empty")]
    pub src_posture: Vec<String>,
}

/// A stored rule with its id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    pub id: String,
    #[serde(flatten)]
    pub rule: AclRule,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAcl {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub entry: AclRule,
}

#[derive(Debug, Deserialize)]
pub struct DeleteAcl {
    #[serde(default)]
    pub id: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/acls", get(list).post(create).put(update).delete(remove))
        .route("/acls/:id", get(get_one))
}

fn load(app: &AppState) -> ServerResult<Vec<AclEntry>> {
    Ok(app.store.get_as(KEY)?.unwrap_or_default())
}

async fn list(State(app): State<AppState>) -> ServerResult<Json<Vec<AclEntry>>> {
    Ok(Json(load(&app)?))
}

async fn get_one(State(app): State<AppState>, Path(id): Path<String>) -> ServerResult<Json<AclEntry>> {
    load(&app)?
        .into_iter()
        .find(|entry| entry.id == id)
        .map(Json)
        .ok_or_else(|| ServerError::NotFound("ACL entry not found".into()))
}

async fn create(
    State(app): State<AppState>,
    payload: Result<Json<AclRule>, JsonRejection>,
) -> ServerResult<(StatusCode, Json<AclEntry>)> {
    let rule = parse_body(payload)?;
    let mut entries = load(&app)?;
    let entry = AclEntry { id: Uuid::new_v4().to_string(), rule };
    entries.push(entry.clone());
    commit(&app.store, KEY, &entries).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn update(
    State(app): State<AppState>,
    payload: Result<Json<UpdateAcl>, JsonRejection>,
) -> ServerResult<Json<AclEntry>> {
    let req = parse_body(payload)?;
    if req.id.is_empty() {
        return Err(ServerError::BadRequest("missing 'id' in request body".into()));
    }

    let mut entries = load(&app)?;
    let entry = entries
        .iter_mut()
        .find(|entry| entry.id == req.id)
        .ok_or_else(|| ServerError::NotFound("ACL entry not found".into()))?;
    entry.rule = req.entry;
    let updated = entry.clone();

    commit(&app.store, KEY, &entries).await?;
    Ok(Json(updated))
}

async fn remove(
    State(app): State<AppState>,
    payload: Result<Json<DeleteAcl>, JsonRejection>,
) -> ServerResult<Json<Value>> {
    let req = parse_body(payload)?;
    if req.id.is_empty() {
        return Err(ServerError::BadRequest("missing 'id' field".into()));
    }

    let mut entries = load(&app)?;
    let before = entries.len();
    entries.retain(|entry| entry.id != req.id);
    if entries.len() == before {
        return Err(ServerError::NotFound("ACL entry not found".into()));
    }

    commit(&app.store, KEY, &entries).await?;
    Ok(message("ACL entry deleted"))
}
