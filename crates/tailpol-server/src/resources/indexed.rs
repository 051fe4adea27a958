//! Collections stored as plain lists and addressed by position.

use std::collections::BTreeMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{commit, message, parse_body};
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

/// A position-addressed collection.
pub trait IndexedItem: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Document key of the collection.
    const KEY: &'static str;
    /// Human name used in messages.
    const LABEL: &'static str;
    /// Field of a PUT body holding the replacement item.
    const UPDATE_FIELD: &'static str;

    /// Check and normalize an item before it is stored.
    fn prepare(&mut self) -> Result<(), String> {
        Ok(())
    }
}

/// An SSH access rule, kept as the client sent it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SshRule(pub Map<String, Value>);

impl IndexedItem for SshRule {
    const KEY: &'static str = "ssh";
    const LABEL: &'static str = "SSH rule";
    const UPDATE_FIELD: &'static str = "rule";
}

/// A policy test case, kept as the client sent it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AclTest(pub Map<String, Value>);

impl IndexedItem for AclTest {
    const KEY: &'static str = "tests";
    const LABEL: &'static str = "ACL test";
    const UPDATE_FIELD: &'static str = "test";
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConnector {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connectors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
}

/// Grants node attributes or app connector configuration to targets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAttrGrant {
    #[serde(default)]
    pub target: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attr: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub app: BTreeMap<String, Vec<AppConnector>>,
}

impl IndexedItem for NodeAttrGrant {
    const KEY: &'static str = "nodeAttrs";
    const LABEL: &'static str = "Node attribute";
    const UPDATE_FIELD: &'static str = "grant";

    /// Exactly one of `attr` and `app` must be set; app grants apply to every node.
    fn prepare(&mut self) -> Result<(), String> {
        match (self.attr.is_empty(), self.app.is_empty()) {
            (false, true) => {
                if self.target.is_empty() {
                    return Err("missing 'target' field".into());
                }
                Ok(())
            }
            (true, false) => {
                self.target = vec!["*".to_string()];
                Ok(())
            }
            _ => Err("either `attr` or `app` must be set, but not both".into()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IndexedUpdate {
    index: Option<i64>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct IndexedDelete {
    index: Option<i64>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(collection_routes::<SshRule>("/ssh"))
        .merge(collection_routes::<AclTest>("/acltests"))
        .merge(collection_routes::<NodeAttrGrant>("/nodeattrs"))
}

fn collection_routes<T: IndexedItem>(base: &str) -> Router<AppState> {
    Router::new()
        .route(base, get(list::<T>).post(create::<T>).put(update::<T>).delete(remove::<T>))
        .route(&format!("{base}/:index"), get(get_one::<T>))
}

fn load<T: IndexedItem>(app: &AppState) -> ServerResult<Vec<T>> {
    Ok(app.store.get_as(T::KEY)?.unwrap_or_default())
}

/// Check an index against the list, yielding a usable position.
fn position<T: IndexedItem>(index: Option<i64>, len: usize) -> ServerResult<usize> {
    let index = match index {
        Some(i) if i >= 0 => i,
        _ => return Err(ServerError::BadRequest("invalid or missing 'index' field".into())),
    };
    usize::try_from(index)
        .ok()
        .filter(|&i| i < len)
        .ok_or_else(|| ServerError::NotFound(format!("{} index out of range", T::LABEL)))
}

async fn list<T: IndexedItem>(State(app): State<AppState>) -> ServerResult<Json<Vec<T>>> {
    Ok(Json(load::<T>(&app)?))
}

async fn get_one<T: IndexedItem>(State(app): State<AppState>, Path(index): Path<String>) -> ServerResult<Json<T>> {
    let index: i64 = index
        .parse()
        .map_err(|_| ServerError::BadRequest("invalid index".into()))?;
    let mut items = load::<T>(&app)?;
    let at = position::<T>(Some(index), items.len())?;
    Ok(Json(items.swap_remove(at)))
}

async fn create<T: IndexedItem>(
    State(app): State<AppState>,
    payload: Result<Json<T>, JsonRejection>,
) -> ServerResult<(StatusCode, Json<T>)> {
    let mut item = parse_body(payload)?;
    item.prepare().map_err(ServerError::BadRequest)?;

    let mut items = load::<T>(&app)?;
    items.push(item.clone());
    commit(&app.store, T::KEY, &items).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn update<T: IndexedItem>(
    State(app): State<AppState>,
    payload: Result<Json<IndexedUpdate>, JsonRejection>,
) -> ServerResult<Json<T>> {
    let mut req = parse_body(payload)?;
    if !matches!(req.index, Some(i) if i >= 0) {
        return Err(ServerError::BadRequest("invalid or missing 'index' field".into()));
    }
    let raw = req
        .fields
        .remove(T::UPDATE_FIELD)
        .ok_or_else(|| ServerError::BadRequest(format!("missing '{}' field", T::UPDATE_FIELD)))?;
    let mut item: T = serde_json::from_value(raw).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    item.prepare().map_err(ServerError::BadRequest)?;

    let mut items = load::<T>(&app)?;
    let at = position::<T>(req.index, items.len())?;
    items[at] = item.clone();
    commit(&app.store, T::KEY, &items).await?;
    Ok(Json(item))
}

async fn remove<T: IndexedItem>(
    State(app): State<AppState>,
    payload: Result<Json<IndexedDelete>, JsonRejection>,
) -> ServerResult<Json<Value>> {
    let req = parse_body(payload)?;
    let mut items = load::<T>(&app)?;
    let at = position::<T>(req.index, items.len())?;
    items.remove(at);
    commit(&app.store, T::KEY, &items).await?;
    Ok(message(format!("{} deleted", T::LABEL)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::testing::{app, call};
    use serde_json::json;

    fn ssh_rule(user: &str) -> Value {
        json!({"action": "accept", "src": ["autogroup:member"], "dst": ["autogroup:self"], "users": [user]})
    }

    #[tokio::test]
    async fn ssh_rules_by_index() {
        let (app, store, _) = app();
        for user in ["root", "ubuntu", "admin"] {
            let (status, _) = call(&app, "POST", "/ssh", Some(ssh_rule(user))).await;
            assert_eq!(status, StatusCode::CREATED);
        }
        assert_eq!(store.get("ssh").unwrap().unwrap().as_array().unwrap().len(), 3);

        let (status, body) = call(&app, "GET", "/ssh/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, ssh_rule("ubuntu"));

        let (status, _) = call(&app, "GET", "/ssh/3", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "GET", "/ssh/one", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&app, "GET", "/ssh/-1", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&app, "PUT", "/ssh", Some(json!({"index": 0, "rule": ssh_rule("nobody")}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, ssh_rule("nobody"));

        let (status, _) = call(&app, "DELETE", "/ssh", Some(json!({"index": 1}))).await;
        assert_eq!(status, StatusCode::OK);
        let (_, list) = call(&app, "GET", "/ssh", None).await;
        assert_eq!(list, json!([ssh_rule("nobody"), ssh_rule("admin")]));
    }

    #[tokio::test]
    async fn update_and_delete_validation() {
        let (app, _, _) = app();
        call(&app, "POST", "/acltests", Some(json!({"src": "alice@example.com", "accept": ["db:5432"]}))).await;

        let (status, _) = call(&app, "PUT", "/acltests", Some(json!({"test": {}}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&app, "PUT", "/acltests", Some(json!({"index": 0}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&app, "PUT", "/acltests", Some(json!({"index": 5, "test": {}}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "DELETE", "/acltests", Some(json!({"index": 5}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "DELETE", "/acltests", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn acl_tests_are_stored_under_tests() {
        let (app, store, _) = app();
        call(&app, "POST", "/acltests", Some(json!({"src": "alice@example.com", "accept": ["db:5432"]}))).await;
        assert_eq!(store.get("tests").unwrap(), Some(json!([{"src": "alice@example.com", "accept": ["db:5432"]}])));
    }

    #[tokio::test]
    async fn node_attrs_need_exactly_one_of_attr_or_app() {
        let (app, _, _) = app();

        let (status, _) = call(&app, "POST", "/nodeattrs", Some(json!({"target": ["*"]}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let both = json!({"target": ["*"], "attr": ["funnel"], "app": {"tailscale.com/app-connectors": [{"name": "x"}]}});
        let (status, _) = call(&app, "POST", "/nodeattrs", Some(both)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&app, "POST", "/nodeattrs", Some(json!({"target": ["tag:web"], "attr": ["funnel"]}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({"target": ["tag:web"], "attr": ["funnel"]}));
    }

    #[tokio::test]
    async fn app_grants_target_every_node() {
        let (app, store, _) = app();
        let grant = json!({
            "target": ["tag:web"],
            "app": {"tailscale.com/app-connectors": [{"name": "github", "connectors": ["tag:connector"], "domains": ["github.com"]}]}
        });
        let (status, body) = call(&app, "POST", "/nodeattrs", Some(grant)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["target"], json!(["*"]));
        assert_eq!(store.get("nodeAttrs").unwrap().unwrap()[0]["target"], json!(["*"]));

        let (status, body) = call(
            &app,
            "PUT",
            "/nodeattrs",
            Some(json!({"index": 0, "grant": {"target": ["tag:db"], "attr": ["mullvad"]}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"target": ["tag:db"], "attr": ["mullvad"]}));
    }

    #[test]
    fn position_checks() {
        assert_eq!(position::<SshRule>(Some(0), 1).unwrap(), 0);
        assert!(matches!(position::<SshRule>(Some(1), 1), Err(ServerError::NotFound(_))));
        assert!(matches!(position::<SshRule>(Some(-1), 1), Err(ServerError::BadRequest(_))));
        assert!(matches!(position::<SshRule>(None, 1), Err(ServerError::BadRequest(_))));
    }
}
