//! Collections stored as a map from a prefixed name to a payload.
//!
//! `groups` is stored as `{"group:eng": ["alice@example.com"]}` and served as
//! `{"name": "eng", "members": ["alice@example.com"]}`. Names are accepted with
//! or without the prefix.

use std::collections::BTreeMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{commit, message, parse_body};
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

/// A name-keyed collection and its item shape on the wire.
pub trait NamedItem: Serialize + DeserializeOwned + Send + Sync + 'static {
    type Payload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Document key of the collection.
    const KEY: &'static str;
    /// Prefix of stored names, may be empty.
    const PREFIX: &'static str;
    /// Human name used in messages.
    const LABEL: &'static str;
    /// Stored names that are not items.
    const RESERVED: &'static [&'static str] = &[];

    fn name(&self) -> &str;
    fn from_parts(name: String, payload: Self::Payload) -> Self;
    fn into_payload(self) -> Self::Payload;

    fn validate(&self) -> Result<(), String> {
        if self.name().is_empty() {
            Err("missing 'name' field".into())
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

impl NamedItem for Group {
    type Payload = Vec<String>;
    const KEY: &'static str = "groups";
    const PREFIX: &'static str = "group:";
    const LABEL: &'static str = "Group";

    fn name(&self) -> &str {
        &self.name
    }
    fn from_parts(name: String, members: Vec<String>) -> Self {
        Self { name, members }
    }
    fn into_payload(self) -> Vec<String> {
        self.members
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagOwner {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owners: Vec<String>,
}

impl NamedItem for TagOwner {
    type Payload = Vec<String>;
    const KEY: &'static str = "tagOwners";
    const PREFIX: &'static str = "tag:";
    const LABEL: &'static str = "TagOwner";

    fn name(&self) -> &str {
        &self.name
    }
    fn from_parts(name: String, owners: Vec<String>) -> Self {
        Self { name, owners }
    }
    fn into_payload(self) -> Vec<String> {
        self.owners
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ip: String,
}

impl NamedItem for Host {
    type Payload = String;
    const KEY: &'static str = "hosts";
    const PREFIX: &'static str = "";
    const LABEL: &'static str = "Host";

    fn name(&self) -> &str {
        &self.name
    }
    fn from_parts(name: String, ip: String) -> Self {
        Self { name, ip }
    }
    fn into_payload(self) -> String {
        self.ip
    }
    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() || self.ip.is_empty() {
            Err("missing 'name' or 'ip' field".into())
        } else {
            Ok(())
        }
    }
}

/// Stored name of the default source posture inside the `postures` map.
pub const DEFAULT_POSTURE_KEY: &str = "defaultSourcePosture";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posture {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rules: Vec<String>,
}

impl NamedItem for Posture {
    type Payload = Vec<String>;
    const KEY: &'static str = "postures";
    const PREFIX: &'static str = "posture:";
    const LABEL: &'static str = "Posture";
    const RESERVED: &'static [&'static str] = &[DEFAULT_POSTURE_KEY];

    fn name(&self) -> &str {
        &self.name
    }
    fn from_parts(name: String, rules: Vec<String>) -> Self {
        Self { name, rules }
    }
    fn into_payload(self) -> Vec<String> {
        self.rules
    }
}

#[derive(Debug, Deserialize)]
struct DeleteByName {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DefaultPosture {
    #[serde(rename = "defaultSourcePosture", default)]
    default_source_posture: Vec<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(collection_routes::<Group>("/groups"))
        .merge(collection_routes::<TagOwner>("/tagowners"))
        .merge(collection_routes::<Host>("/hosts"))
        .route(
            "/postures",
            get(list_postures).post(create::<Posture>).put(update::<Posture>).delete(remove::<Posture>),
        )
        .route("/postures/:name", get(get_one::<Posture>))
        .route(
            "/postures/default",
            get(get_default_posture).put(set_default_posture).delete(delete_default_posture),
        )
}

fn collection_routes<T: NamedItem>(base: &str) -> Router<AppState> {
    Router::new()
        .route(base, get(list::<T>).post(create::<T>).put(update::<T>).delete(remove::<T>))
        .route(&format!("{base}/:name"), get(get_one::<T>))
}

fn stored_name<T: NamedItem>(name: &str) -> String {
    if name.starts_with(T::PREFIX) {
        name.to_string()
    } else {
        format!("{}{name}", T::PREFIX)
    }
}

fn display_name<T: NamedItem>(stored: &str) -> String {
    stored.strip_prefix(T::PREFIX).unwrap_or(stored).to_string()
}

fn load<T: NamedItem>(app: &AppState) -> ServerResult<BTreeMap<String, T::Payload>> {
    Ok(app.store.get_as(T::KEY)?.unwrap_or_default())
}

fn items<T: NamedItem>(map: &BTreeMap<String, T::Payload>) -> Vec<T> {
    map.iter()
        .filter(|(k, _)| !T::RESERVED.contains(&k.as_str()))
        .map(|(k, v)| T::from_parts(display_name::<T>(k), v.clone()))
        .collect()
}

fn not_found<T: NamedItem>() -> ServerError {
    ServerError::NotFound(format!("{} not found", T::LABEL))
}

async fn list<T: NamedItem>(State(app): State<AppState>) -> ServerResult<Json<Vec<T>>> {
    Ok(Json(items::<T>(&load::<T>(&app)?)))
}

async fn get_one<T: NamedItem>(State(app): State<AppState>, Path(name): Path<String>) -> ServerResult<Json<T>> {
    let map = load::<T>(&app)?;
    let key = stored_name::<T>(&name);
    if T::RESERVED.contains(&key.as_str()) {
        return Err(not_found::<T>());
    }
    map.get(&key)
        .map(|payload| Json(T::from_parts(display_name::<T>(&key), payload.clone())))
        .ok_or_else(not_found::<T>)
}

async fn create<T: NamedItem>(
    State(app): State<AppState>,
    payload: Result<Json<T>, JsonRejection>,
) -> ServerResult<(StatusCode, Json<T>)> {
    let item = parse_body(payload)?;
    item.validate().map_err(ServerError::BadRequest)?;

    let mut map = load::<T>(&app)?;
    let key = stored_name::<T>(item.name());
    if map.contains_key(&key) || T::RESERVED.contains(&key.as_str()) {
        return Err(ServerError::Conflict(format!("{} already exists", T::LABEL)));
    }

    let name = display_name::<T>(&key);
    let payload = item.into_payload();
    map.insert(key, payload.clone());
    commit(&app.store, T::KEY, &map).await?;
    Ok((StatusCode::CREATED, Json(T::from_parts(name, payload))))
}

async fn update<T: NamedItem>(
    State(app): State<AppState>,
    payload: Result<Json<T>, JsonRejection>,
) -> ServerResult<Json<T>> {
    let item = parse_body(payload)?;
    item.validate().map_err(ServerError::BadRequest)?;

    let mut map = load::<T>(&app)?;
    let key = stored_name::<T>(item.name());
    if T::RESERVED.contains(&key.as_str()) || !map.contains_key(&key) {
        return Err(not_found::<T>());
    }

    let name = display_name::<T>(&key);
    let payload = item.into_payload();
    map.insert(key, payload.clone());
    commit(&app.store, T::KEY, &map).await?;
    Ok(Json(T::from_parts(name, payload)))
}

async fn remove<T: NamedItem>(
    State(app): State<AppState>,
    payload: Result<Json<DeleteByName>, JsonRejection>,
) -> ServerResult<Json<Value>> {
    let req = parse_body(payload)?;
    if req.name.is_empty() {
        return Err(ServerError::BadRequest("missing 'name' field".into()));
    }

    let mut map = load::<T>(&app)?;
    let key = stored_name::<T>(&req.name);
    if T::RESERVED.contains(&key.as_str()) || map.remove(&key).is_none() {
        return Err(not_found::<T>());
    }

    commit(&app.store, T::KEY, &map).await?;
    Ok(message(format!("{} deleted", T::LABEL)))
}

async fn list_postures(State(app): State<AppState>) -> ServerResult<Json<Value>> {
    let map = load::<Posture>(&app)?;
    Ok(Json(json!({
        DEFAULT_POSTURE_KEY: map.get(DEFAULT_POSTURE_KEY).cloned().unwrap_or_default(),
        "items": items::<Posture>(&map),
    })))
}

async fn get_default_posture(State(app): State<AppState>) -> ServerResult<Json<DefaultPosture>> {
    let map = load::<Posture>(&app)?;
    Ok(Json(DefaultPosture {
        default_source_posture: map.get(DEFAULT_POSTURE_KEY).cloned().unwrap_or_default(),
    }))
}

async fn set_default_posture(
    State(app): State<AppState>,
    payload: Result<Json<DefaultPosture>, JsonRejection>,
) -> ServerResult<Json<DefaultPosture>> {
    let body = parse_body(payload)?;
    let mut map = load::<Posture>(&app)?;
    if body.default_source_posture.is_empty() {
        map.remove(DEFAULT_POSTURE_KEY);
    } else {
        map.insert(DEFAULT_POSTURE_KEY.to_string(), body.default_source_posture.clone());
    }
    commit(&app.store, Posture::KEY, &map).await?;
    Ok(Json(body))
}

async fn delete_default_posture(State(app): State<AppState>) -> ServerResult<Json<Value>> {
    let mut map = load::<Posture>(&app)?;
    map.remove(DEFAULT_POSTURE_KEY);
    commit(&app.store, Posture::KEY, &map).await?;
    Ok(message("defaultSourcePosture removed"))
}
