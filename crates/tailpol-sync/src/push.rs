//! Delivery of the sanitized policy to the remote system of record.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{SyncError, SyncResult};

/// Public Tailscale API.
pub const DEFAULT_API_BASE: &str = "https://api.tailscale.com";

/// Per-request timeout when none is configured.
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Tokens are refreshed this long before the server says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Replaces the remote policy with a payload.
#[async_trait]
pub trait PolicyPusher: Send + Sync {
    async fn push(&self, payload: Vec<u8>) -> SyncResult<()>;
}

/// How requests to the Tailscale API are authenticated.
#[derive(Clone)]
pub enum ApiCredentials {
    /// A static API access token.
    ApiKey(String),
    /// OAuth client credentials exchanged for short-lived access tokens.
    OAuth { client_id: String, client_secret: String },
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ApiKey(..)"),
            Self::OAuth { client_id, .. } => {
                f.debug_struct("OAuth").field("client_id", client_id).finish_non_exhaustive()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// [`PolicyPusher`] that POSTs to `{base}/api/v2/tailnet/{tailnet}/acl`.
pub struct TailscaleApi {
    client: reqwest::Client,
    base: String,
    tailnet: String,
    credentials: ApiCredentials,
    token: Mutex<Option<CachedToken>>,
}

impl TailscaleApi {
    pub fn new(
        base: impl Into<String>,
        tailnet: impl Into<String>,
        credentials: ApiCredentials,
        timeout: Duration,
    ) -> SyncResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
            tailnet: tailnet.into(),
            credentials,
            token: Mutex::new(None),
        })
    }

    pub fn acl_url(&self) -> String {
        format!("{}/api/v2/tailnet/{}/acl", self.base, self.tailnet)
    }

    fn token_url(&self) -> String {
        format!("{}/api/v2/oauth/token", self.base)
    }

    async fn bearer(&self) -> SyncResult<String> {
        let (client_id, client_secret) = match &self.credentials {
            ApiCredentials::ApiKey(key) => return Ok(key.clone()),
            ApiCredentials::OAuth { client_id, client_secret } => (client_id, client_secret),
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.token.clone());
            }
        }

        let response = self
            .client
            .post(self.token_url())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::TokenExchange(format!("status {status}: {}", body.trim())));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::TokenExchange(e.to_string()))?;

        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(0));
        debug!(expires_in = lifetime.as_secs(), "obtained oauth access token");
        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        });
        Ok(token.access_token)
    }
}

impl fmt::Debug for TailscaleApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TailscaleApi")
            .field("base", &self.base)
            .field("tailnet", &self.tailnet)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PolicyPusher for TailscaleApi {
    async fn push(&self, payload: Vec<u8>) -> SyncResult<()> {
        let token = self.bearer().await?;
        let response = self
            .client
            .post(self.acl_url())
            .bearer_auth(token)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SyncError::Rejected { status: status.as_u16(), body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// A captured HTTP request: request line, lowercased headers, body.
    #[derive(Debug)]
    struct Captured {
        line: String,
        headers: Vec<(String, String)>,
        body: String,
    }

    impl Captured {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
        }
    }

    async fn read_request(conn: &mut tokio::net::TcpStream) -> Captured {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let header_end = loop {
            let n = conn.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let mut lines = head.lines();
        let line = lines.next().unwrap().to_string();
        let headers: Vec<(String, String)> = lines
            .filter_map(|l| l.split_once(':'))
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
            .collect();
        let length: usize = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| v.parse().unwrap())
            .unwrap_or(0);
        while buf.len() < header_end + length {
            let n = conn.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before body");
            buf.extend_from_slice(&chunk[..n]);
        }
        let body = String::from_utf8_lossy(&buf[header_end..header_end + length]).to_string();
        Captured { line, headers, body }
    }

    /// Answer each incoming connection with the next canned `(status, body)`.
    async fn fake_api(responses: Vec<(&'static str, &'static str)>) -> (String, tokio::task::JoinHandle<Vec<Captured>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let mut captured = Vec::new();
            for (status, body) in responses {
                let (mut conn, _) = listener.accept().await.unwrap();
                captured.push(read_request(&mut conn).await);
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                conn.write_all(response.as_bytes()).await.unwrap();
                conn.shutdown().await.ok();
            }
            captured
        });
        (base, handle)
    }

    #[tokio::test]
    async fn pushes_with_api_key() {
        let (base, server) = fake_api(vec![("200 OK", "{}")]).await;
        let api = TailscaleApi::new(&base, "example.com", ApiCredentials::ApiKey("tskey-api-123".into()), DEFAULT_PUSH_TIMEOUT)
            .unwrap();

        api.push(br#"{"acls":[{"action":"accept"}]}"#.to_vec()).await.unwrap();

        let captured = server.await.unwrap();
        assert_eq!(captured[0].line, "POST /api/v2/tailnet/example.com/acl HTTP/1.1");
        assert_eq!(captured[0].header("authorization"), Some("Bearer tskey-api-123"));
        assert_eq!(captured[0].header("content-type"), Some("application/json"));
        assert_eq!(captured[0].body, r#"{"acls":[{"action":"accept"}]}"#);
    }

    #[tokio::test]
    async fn rejection_carries_status_and_body() {
        let (base, server) = fake_api(vec![("400 Bad Request", r#"{"message":"parse error"}"#)]).await;
        let api = TailscaleApi::new(&base, "-", ApiCredentials::ApiKey("k".into()), DEFAULT_PUSH_TIMEOUT).unwrap();

        let err = api.push(b"{}".to_vec()).await.unwrap_err();
        match err {
            SyncError::Rejected { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("parse error"));
            }
            other => panic!("unexpected error: {other}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn oauth_token_is_exchanged_once_and_cached() {
        let (base, server) = fake_api(vec![
            ("200 OK", r#"{"access_token":"tok-1","token_type":"Bearer","expires_in":3600}"#),
            ("200 OK", "{}"),
            ("200 OK", "{}"),
        ])
        .await;
        let credentials = ApiCredentials::OAuth { client_id: "cid".into(), client_secret: "secret".into() };
        let api = Arc::new(TailscaleApi::new(&base, "example.com", credentials, DEFAULT_PUSH_TIMEOUT).unwrap());

        api.push(b"{}".to_vec()).await.unwrap();
        api.push(b"{}".to_vec()).await.unwrap();

        let captured = server.await.unwrap();
        assert_eq!(captured[0].line, "POST /api/v2/oauth/token HTTP/1.1");
        assert!(captured[0].body.contains("grant_type=client_credentials"));
        assert!(captured[0].body.contains("client_id=cid"));
        assert_eq!(captured[1].header("authorization"), Some("Bearer tok-1"));
        assert_eq!(captured[2].header("authorization"), Some("Bearer tok-1"));
    }

    #[tokio::test]
    async fn failed_token_exchange_is_reported() {
        let (base, server) = fake_api(vec![("401 Unauthorized", r#"{"message":"invalid client"}"#)]).await;
        let credentials = ApiCredentials::OAuth { client_id: "cid".into(), client_secret: "bad".into() };
        let api = TailscaleApi::new(&base, "example.com", credentials, DEFAULT_PUSH_TIMEOUT).unwrap();

        let err = api.push(b"{}".to_vec()).await.unwrap_err();
        assert!(matches!(err, SyncError::TokenExchange(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_remote_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let api = TailscaleApi::new(&base, "t", ApiCredentials::ApiKey("k".into()), Duration::from_secs(2)).unwrap();
        assert!(matches!(api.push(b"{}".to_vec()).await, Err(SyncError::Transport(_))));
    }

    #[test]
    fn trailing_slash_in_base_is_ignored() {
        let api = TailscaleApi::new("https://api.example.com/", "corp", ApiCredentials::ApiKey("k".into()), DEFAULT_PUSH_TIMEOUT)
            .unwrap();
        assert_eq!(api.acl_url(), "https://api.example.com/api/v2/tailnet/corp/acl");
    }

    #[test]
    fn debug_hides_secrets() {
        let creds = ApiCredentials::OAuth { client_id: "cid".into(), client_secret: "hunter2".into() };
        assert!(!format!("{creds:?}").contains("hunter2"));
        assert!(!format!("{:?}", ApiCredentials::ApiKey("tskey".into())).contains("tskey"));
    }
}
