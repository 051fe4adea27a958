//! The capability grammar: method/endpoint allow-lists with a wildcard.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GateError, GateResult};

/// Matches every method or every endpoint.
pub const WILDCARD: &str = "*";

/// The only role name honored inside a role-wrapped grant.
pub const MANAGER_ROLE: &str = "manager";

/// One sub-capability: which methods may be used on which endpoints.
///
/// An endpoint is the first path segment of the request (`/acls/123` is
/// `acls`). Either list may contain [`WILDCARD`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapabilityGrant {
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub endpoints: Vec<String>,
}

impl CapabilityGrant {
    pub fn new<M, E>(methods: M, endpoints: E) -> Self
    where
        M: IntoIterator,
        M::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            methods: methods.into_iter().map(Into::into).collect(),
            endpoints: endpoints.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if this grant allows `method` on `endpoint`.
    pub fn grants(&self, method: &str, endpoint: &str) -> bool {
        matches_or_wildcard(&self.methods, method) && matches_or_wildcard(&self.endpoints, endpoint)
    }
}

fn matches_or_wildcard(allowed: &[String], item: &str) -> bool {
    allowed.iter().any(|a| a == WILDCARD || a == item)
}

/// A list element as it appears in the identity's capability map.
///
/// Either a bare grant, or a grant wrapped under a role name
/// (`{"manager": {"methods": [...], "endpoints": [...]}}`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GrantEntry {
    Bare(CapabilityGrant),
    Roles(HashMap<String, CapabilityGrant>),
}

/// Parse a namespace value into the grants it carries.
///
/// The value must be a JSON array. Role-wrapped entries contribute only
/// their [`MANAGER_ROLE`] grant.
pub fn parse_grants(value: &Value) -> GateResult<Vec<CapabilityGrant>> {
    let entries: Vec<GrantEntry> = serde_json::from_value(value.clone())
        .map_err(|e| GateError::MalformedCapability(e.to_string()))?;

    Ok(entries
        .into_iter()
        .filter_map(|entry| match entry {
            GrantEntry::Bare(grant) => Some(grant),
            GrantEntry::Roles(mut roles) => roles.remove(MANAGER_ROLE),
        })
        .collect())
}

/// The endpoint token of a request path: its first segment.
///
/// `/` and the empty path yield `""`, which no real grant names.
pub fn first_path_segment(path: &str) -> &str {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    trimmed.split('/').next().unwrap_or("")
}

/// Returns `true` if any grant allows `method` on `endpoint`.
pub fn any_grants(grants: &[CapabilityGrant], method: &str, endpoint: &str) -> bool {
    grants.iter().any(|g| g.grants(method, endpoint))
}
