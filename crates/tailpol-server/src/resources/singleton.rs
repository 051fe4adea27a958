//! Collections holding one document each.

use std::collections::BTreeMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{commit, message, parse_body, remove as remove_key};
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

pub trait Singleton: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    const KEY: &'static str;
    const LABEL: &'static str;
}

/// Tailnet-wide network settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "disableIPv4", default, skip_serializing_if = "std::ops::Not::not")]
    pub disable_ipv4: bool,
    #[serde(rename = "oneCGNATRoute", default, skip_serializing_if = "String::is_empty")]
    pub one_cgnat_route: String,
    #[serde(rename = "randomizeClientPort", default, skip_serializing_if = "std::ops::Not::not")]
    pub randomize_client_port: bool,
}

impl Singleton for Settings {
    const KEY: &'static str = "settings";
    const LABEL: &'static str = "settings";
}

/// Who may advertise routes and exit nodes without manual approval.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoApprovers {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub routes: BTreeMap<String, Vec<String>>,
    #[serde(rename = "exitNode", default, skip_serializing_if = "Vec::is_empty")]
    pub exit_node: Vec<String>,
}

impl Singleton for AutoApprovers {
    const KEY: &'static str = "autoApprovers";
    const LABEL: &'static str = "autoApprovers";
}

/// Custom DERP relay configuration, kept as the client sent it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DerpMap(pub Map<String, Value>);

impl Singleton for DerpMap {
    const KEY: &'static str = "derpMap";
    const LABEL: &'static str = "DERPMap";
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(document_routes::<Settings>("/settings"))
        .merge(document_routes::<AutoApprovers>("/autoapprovers"))
        .merge(document_routes::<DerpMap>("/derpmap"))
}

fn document_routes<T: Singleton>(path: &str) -> Router<AppState> {
    Router::new().route(path, get(read::<T>).post(create::<T>).put(update::<T>).delete(delete::<T>))
}

fn load<T: Singleton>(app: &AppState) -> ServerResult<Option<T>> {
    Ok(app.store.get_as(T::KEY)?)
}

async fn read<T: Singleton>(State(app): State<AppState>) -> ServerResult<Json<T>> {
    Ok(Json(load::<T>(&app)?.unwrap_or_default()))
}

async fn create<T: Singleton>(
    State(app): State<AppState>,
    payload: Result<Json<T>, JsonRejection>,
) -> ServerResult<(StatusCode, Json<T>)> {
    let doc = parse_body(payload)?;
    if load::<T>(&app)?.is_some() {
        return Err(ServerError::Conflict(format!("{} already exist", T::LABEL)));
    }
    commit(&app.store, T::KEY, &doc).await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

async fn update<T: Singleton>(
    State(app): State<AppState>,
    payload: Result<Json<T>, JsonRejection>,
) -> ServerResult<Json<T>> {
    let doc = parse_body(payload)?;
    if load::<T>(&app)?.is_none() {
        return Err(ServerError::NotFound(format!("no existing {} to update", T::LABEL)));
    }
    commit(&app.store, T::KEY, &doc).await?;
    Ok(Json(doc))
}

async fn delete<T: Singleton>(State(app): State<AppState>) -> ServerResult<Json<Value>> {
    if load::<T>(&app)?.is_none() {
        return Err(ServerError::NotFound(format!("no existing {} to delete", T::LABEL)));
    }
    remove_key(&app.store, T::KEY).await?;
    Ok(message(format!("{} deleted", T::LABEL)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::testing::{app, call};
    use serde_json::json;

    #[tokio::test]
    async fn settings_lifecycle() {
        let (app, store, _) = app();

        let (status, body) = call(&app, "GET", "/settings", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({}));

        let (status, _) = call(&app, "PUT", "/settings", Some(json!({"disableIPv4": true}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "DELETE", "/settings", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&app, "POST", "/settings", Some(json!({"disableIPv4": true, "oneCGNATRoute": "mac-only"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({"disableIPv4": true, "oneCGNATRoute": "mac-only"}));

        let (status, _) = call(&app, "POST", "/settings", Some(json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = call(&app, "PUT", "/settings", Some(json!({"randomizeClientPort": true}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"randomizeClientPort": true}));
        assert_eq!(store.get("settings").unwrap(), Some(json!({"randomizeClientPort": true})));

        let (status, _) = call(&app, "DELETE", "/settings", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(store.get("settings").unwrap(), None);
    }

    #[tokio::test]
    async fn auto_approvers_round_trip_through_the_store() {
        let (app, store, _) = app();
        let doc = json!({"routes": {"10.0.0.0/8": ["group:net"]}, "exitNode": ["tag:exit"]});
        let (status, _) = call(&app, "POST", "/autoapprovers", Some(doc.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(store.get("autoApprovers").unwrap(), Some(doc.clone()));

        let (_, body) = call(&app, "GET", "/autoapprovers", None).await;
        assert_eq!(body, doc);
    }

    #[tokio::test]
    async fn derp_map_is_opaque() {
        let (app, store, _) = app();
        let doc = json!({"OmitDefaultRegions": true, "Regions": {"900": {"RegionID": 900, "Nodes": []}}});
        call(&app, "POST", "/derpmap", Some(doc.clone())).await;
        assert_eq!(store.get("derpMap").unwrap(), Some(doc));

        let (status, _) = call(&app, "POST", "/derpmap", Some(json!([]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
