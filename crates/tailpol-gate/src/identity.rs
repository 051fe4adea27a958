use std::net::SocketAddr;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::GateResult;

/// Who is calling, as reported by the identity side-channel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PeerIdentity {
    pub login_name: String,
    pub display_name: String,
    /// Name of the calling node, when the lookup reports one.
    pub node_name: Option<String>,
    /// Free-form capability map keyed by application namespace.
    pub capabilities: Map<String, Value>,
}

impl PeerIdentity {
    pub fn new(login_name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            login_name: login_name.into(),
            display_name: display_name.into(),
            ..Self::default()
        }
    }

    /// Attach a namespace value to the capability map.
    pub fn with_capability(mut self, namespace: impl Into<String>, value: Value) -> Self {
        self.capabilities.insert(namespace.into(), value);
        self
    }
}

/// Resolves a caller's network address to an identity.
///
/// Implementations trust the address: the service's network position is what
/// guarantees it is authentic.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, addr: SocketAddr) -> GateResult<PeerIdentity>;
}
