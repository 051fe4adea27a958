//! Identity lookup through the local tailscaled LocalAPI.
//!
//! tailscaled answers `GET /localapi/v0/whois?addr=<ip:port>` on its unix
//! socket with the user profile and peer capability map of the node that owns
//! the address.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{header, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::net::UnixStream;
use tracing::debug;

use crate::error::{GateError, GateResult};
use crate::identity::{IdentityResolver, PeerIdentity};

/// Default location of the tailscaled LocalAPI socket on Linux.
pub const DEFAULT_SOCKET: &str = "/var/run/tailscale/tailscaled.sock";

/// Upper bound on one whois round trip; a stalled tailscaled denies rather
/// than holding the request open.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Host header tailscaled expects on LocalAPI requests.
const LOCALAPI_HOST: &str = "local-tailscaled.sock";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WhoIsResponse {
    #[serde(default)]
    node: Option<WhoIsNode>,
    #[serde(default)]
    user_profile: Option<WhoIsUser>,
    #[serde(default)]
    cap_map: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WhoIsNode {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WhoIsUser {
    #[serde(default)]
    login_name: String,
    #[serde(default)]
    display_name: String,
}

/// Decode a LocalAPI whois body into a [`PeerIdentity`].
pub fn identity_from_whois(body: &[u8]) -> GateResult<PeerIdentity> {
    let whois: WhoIsResponse = serde_json::from_slice(body)
        .map_err(|e| GateError::LookupFailed(format!("bad whois response: {e}")))?;

    let (login_name, display_name) = whois
        .user_profile
        .map(|u| (u.login_name, u.display_name))
        .unwrap_or_default();

    Ok(PeerIdentity {
        login_name,
        display_name,
        node_name: whois.node.map(|n| n.name).filter(|n| !n.is_empty()),
        capabilities: whois.cap_map.unwrap_or_default(),
    })
}

fn escape_addr(addr: &SocketAddr) -> String {
    addr.to_string()
        .replace('[', "%5B")
        .replace(']', "%5D")
        .replace(':', "%3A")
}

/// [`IdentityResolver`] backed by tailscaled's LocalAPI.
#[derive(Clone, Debug)]
pub struct TailscaleWhois {
    socket: PathBuf,
    timeout: Duration,
}

impl TailscaleWhois {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    async fn whois(&self, addr: SocketAddr) -> GateResult<Bytes> {
        let lookup_err = |e: &dyn std::fmt::Display| GateError::LookupFailed(e.to_string());

        let stream = UnixStream::connect(&self.socket)
            .await
            .map_err(|e| GateError::LookupFailed(format!("connect {}: {e}", self.socket.display())))?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| lookup_err(&e))?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "localapi connection closed with error");
            }
        });

        let request = Request::builder()
            .uri(format!("/localapi/v0/whois?addr={}", escape_addr(&addr)))
            .header(header::HOST, LOCALAPI_HOST)
            .body(Empty::<Bytes>::new())
            .map_err(|e| lookup_err(&e))?;

        let response = sender.send_request(request).await.map_err(|e| lookup_err(&e))?;
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| lookup_err(&e))?
            .to_bytes();

        if status != StatusCode::OK {
            return Err(GateError::LookupFailed(format!(
                "whois {addr} returned {status}: {}",
                String::from_utf8_lossy(&body).trim()
            )));
        }
        Ok(body)
    }
}

impl Default for TailscaleWhois {
    fn default() -> Self {
        Self::new(DEFAULT_SOCKET)
    }
}

#[async_trait]
impl IdentityResolver for TailscaleWhois {
    async fn resolve(&self, addr: SocketAddr) -> GateResult<PeerIdentity> {
        let body = tokio::time::timeout(self.timeout, self.whois(addr))
            .await
            .map_err(|_| GateError::LookupFailed(format!("whois {addr} timed out after {:?}", self.timeout)))??;
        identity_from_whois(&body)
    }
}
