//! Capability gate for tailpol.
//!
//! Every request is resolved to a peer identity through a side channel and
//! checked against the grants that identity carries under the service's
//! capability namespace. Anything that cannot be proven allowed is denied.
//!
//! # Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use tailpol_gate::{evaluate, PeerIdentity, DEFAULT_NAMESPACE};
//!
//! let identity = PeerIdentity::new("alice@example.com", "Alice").with_capability(
//!     DEFAULT_NAMESPACE,
//!     json!([{"methods": ["GET"], "endpoints": ["acls"]}]),
//! );
//! assert!(evaluate(&identity, DEFAULT_NAMESPACE, "GET", "/acls").is_ok());
//! assert!(evaluate(&identity, DEFAULT_NAMESPACE, "POST", "/acls").is_err());
//! assert!(evaluate(&identity, DEFAULT_NAMESPACE, "GET", "/hosts").is_err());
//! ```

pub mod authorizer;
pub mod config;
pub mod error;
pub mod grant;
pub mod identity;
#[cfg(unix)]
pub mod tailscale;

// Re-exports for convenience.
pub use authorizer::{evaluate, Authorized, CapabilityAuthorizer, StaticResolver};
pub use config::{GateConfig, DEFAULT_NAMESPACE};
pub use error::{GateError, GateResult, DENIED_MESSAGE};
pub use grant::{first_path_segment, parse_grants, CapabilityGrant, WILDCARD};
pub use identity::{IdentityResolver, PeerIdentity};
#[cfg(unix)]
pub use tailscale::{TailscaleWhois, DEFAULT_LOOKUP_TIMEOUT, DEFAULT_SOCKET};

/// Default tailscaled socket on platforms without unix sockets; unused there.
#[cfg(not(unix))]
pub const DEFAULT_SOCKET: &str = "/var/run/tailscale/tailscaled.sock";
