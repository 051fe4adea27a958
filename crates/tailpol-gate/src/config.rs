use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::authorizer::CapabilityAuthorizer;

/// Capability namespace read from the caller's capability map.
pub const DEFAULT_NAMESPACE: &str = "tailpol.dev/cap/policy";

/// Configuration for the capability gate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Capability map key holding this service's grants.
    pub namespace: String,
    /// Path of the tailscaled LocalAPI socket used for identity lookups.
    pub tailscaled_socket: PathBuf,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            tailscaled_socket: PathBuf::from(crate::DEFAULT_SOCKET),
        }
    }
}

impl GateConfig {
    /// Build an authorizer that looks callers up through tailscaled.
    #[cfg(unix)]
    pub fn tailscale_authorizer(&self) -> CapabilityAuthorizer {
        let resolver = crate::tailscale::TailscaleWhois::new(&self.tailscaled_socket);
        CapabilityAuthorizer::new(Arc::new(resolver), self.namespace.clone())
    }

    /// Build an authorizer around any resolver.
    pub fn authorizer(&self, resolver: Arc<dyn crate::IdentityResolver>) -> CapabilityAuthorizer {
        CapabilityAuthorizer::new(resolver, self.namespace.clone())
    }
}
