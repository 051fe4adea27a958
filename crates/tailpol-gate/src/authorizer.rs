//! Deny-by-default request gate.
//!
//! Every request is checked in three steps, and the first failure wins:
//!
//! 1. **Lookup**: the caller's address resolves to a [`PeerIdentity`].
//! 2. **Namespace**: the identity carries a value under our capability namespace.
//! 3. **Grant**: some grant in that value allows the method on the endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::DEFAULT_NAMESPACE;
use crate::error::{GateError, GateResult};
use crate::grant::{any_grants, first_path_segment, parse_grants};
use crate::identity::{IdentityResolver, PeerIdentity};

/// A request that passed the gate.
#[derive(Clone, Debug, PartialEq)]
pub struct Authorized {
    pub identity: PeerIdentity,
    /// The endpoint token the decision was made on.
    pub endpoint: String,
}

/// Check a resolved identity against a request, without any I/O.
pub fn evaluate(
    identity: &PeerIdentity,
    namespace: &str,
    method: &str,
    path: &str,
) -> GateResult<()> {
    let value = identity
        .capabilities
        .get(namespace)
        .ok_or_else(|| GateError::MissingCapability { namespace: namespace.to_string() })?;

    let grants = parse_grants(value)?;
    let endpoint = first_path_segment(path);

    if any_grants(&grants, method, endpoint) {
        Ok(())
    } else {
        Err(GateError::NotPermitted {
            method: method.to_string(),
            endpoint: endpoint.to_string(),
        })
    }
}

/// Resolves callers and evaluates their grants.
#[derive(Clone)]
pub struct CapabilityAuthorizer {
    resolver: Arc<dyn IdentityResolver>,
    namespace: String,
}

impl CapabilityAuthorizer {
    pub fn new(resolver: Arc<dyn IdentityResolver>, namespace: impl Into<String>) -> Self {
        Self { resolver, namespace: namespace.into() }
    }

    /// An authorizer reading the default capability namespace.
    pub fn with_default_namespace(resolver: Arc<dyn IdentityResolver>) -> Self {
        Self::new(resolver, DEFAULT_NAMESPACE)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Decide whether the caller at `addr` may issue `method` on `path`.
    pub async fn authorize(&self, addr: SocketAddr, method: &str, path: &str) -> GateResult<Authorized> {
        let identity = match self.resolver.resolve(addr).await {
            Ok(identity) => identity,
            Err(err) => {
                warn!(ip = %addr.ip(), method, path, error = %err, "identity lookup failed");
                return Err(err);
            }
        };

        info!(
            ip = %addr.ip(),
            login = %identity.login_name,
            display_name = %identity.display_name,
            method,
            path,
            "request"
        );

        match evaluate(&identity, &self.namespace, method, path) {
            Ok(()) => Ok(Authorized {
                endpoint: first_path_segment(path).to_string(),
                identity,
            }),
            Err(err) => {
                warn!(
                    login = %identity.login_name,
                    method,
                    path,
                    reason = %err,
                    "request denied"
                );
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for CapabilityAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityAuthorizer")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// Resolver that answers every lookup with the same identity, or fails.
///
/// Used by tests and by embedders that authenticate callers elsewhere.
#[derive(Clone, Debug)]
pub struct StaticResolver {
    identity: Option<PeerIdentity>,
}

impl StaticResolver {
    pub fn new(identity: PeerIdentity) -> Self {
        Self { identity: Some(identity) }
    }

    /// A resolver whose every lookup fails.
    pub fn failing() -> Self {
        Self { identity: None }
    }
}

#[async_trait::async_trait]
impl IdentityResolver for StaticResolver {
    async fn resolve(&self, addr: SocketAddr) -> GateResult<PeerIdentity> {
        self.identity
            .clone()
            .ok_or_else(|| GateError::LookupFailed(format!("no identity for {addr}")))
    }
}
