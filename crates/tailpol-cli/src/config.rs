//! Resolved runtime settings: flags and environment over the TOML file over
//! built-in defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;
use tailpol_gate::GateConfig;
use tailpol_server::ServerConfig;
use tailpol_store::S3Options;
use tailpol_sync::{ApiCredentials, DEFAULT_API_BASE, DEFAULT_PUSH_TIMEOUT, DEFAULT_SYNC_INTERVAL};

use crate::cli::{Cli, LogFormat};

pub const DEFAULT_STORAGE: &str = "file://state.json";

/// The `--config` file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub storage: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_region: Option<String>,
    pub listen: Option<SocketAddr>,
    pub tailnet: Option<String>,
    pub api_key: Option<String>,
    pub oauth_client_id: Option<String>,
    pub oauth_client_secret: Option<String>,
    pub api_base_url: Option<String>,
    pub sync_interval: Option<u64>,
    pub push_timeout: Option<u64>,
    pub capability_namespace: Option<String>,
    pub tailscaled_socket: Option<PathBuf>,
    pub debug: Option<bool>,
    pub log_format: Option<LogFormat>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config file {}", path.display()))
    }
}

/// Remote sync target; present only when both a tailnet and credentials are set.
#[derive(Clone, Debug)]
pub struct SyncSettings {
    pub tailnet: String,
    pub credentials: ApiCredentials,
    pub api_base_url: String,
    pub interval: Duration,
    pub push_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub storage: String,
    pub s3: S3Options,
    pub server: ServerConfig,
    pub gate: GateConfig,
    pub sync: Option<SyncSettings>,
    pub debug: bool,
    pub log_format: LogFormat,
}

impl Settings {
    /// Merge the command line with its config file, if one is named.
    pub fn resolve(cli: Cli) -> anyhow::Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(cli, file)
    }

    pub fn merge(cli: Cli, file: FileConfig) -> anyhow::Result<Self> {
        let debug = cli.debug || file.debug.unwrap_or(false);

        let gate_defaults = GateConfig::default();
        let gate = GateConfig {
            namespace: cli.capability_namespace.or(file.capability_namespace).unwrap_or(gate_defaults.namespace),
            tailscaled_socket: cli
                .tailscaled_socket
                .or(file.tailscaled_socket)
                .unwrap_or(gate_defaults.tailscaled_socket),
        };

        let credentials = credentials(
            cli.api_key.or(file.api_key),
            cli.oauth_client_id.or(file.oauth_client_id),
            cli.oauth_client_secret.or(file.oauth_client_secret),
        )?;
        let interval = cli
            .sync_interval
            .or(file.sync_interval)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SYNC_INTERVAL);
        if interval.is_zero() {
            bail!("sync interval must be at least one second");
        }
        let push_timeout = cli
            .push_timeout
            .or(file.push_timeout)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_PUSH_TIMEOUT);

        let tailnet = cli.tailnet.or(file.tailnet).filter(|t| !t.is_empty());
        let sync = match (tailnet, credentials) {
            (Some(tailnet), Some(credentials)) => Some(SyncSettings {
                tailnet,
                credentials,
                api_base_url: cli.api_base_url.or(file.api_base_url).unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
                interval,
                push_timeout,
            }),
            _ => None,
        };

        Ok(Self {
            storage: cli.storage.or(file.storage).unwrap_or_else(|| DEFAULT_STORAGE.to_string()),
            s3: S3Options {
                endpoint: cli.s3_endpoint.or(file.s3_endpoint),
                region: cli.s3_region.or(file.s3_region),
            },
            server: ServerConfig {
                listen: cli.listen.or(file.listen).unwrap_or(ServerConfig::default().listen),
                debug,
            },
            gate,
            sync,
            debug,
            log_format: cli.log_format.or(file.log_format).unwrap_or_default(),
        })
    }
}

/// An API key wins over OAuth; OAuth needs both halves.
fn credentials(
    api_key: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
) -> anyhow::Result<Option<ApiCredentials>> {
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        return Ok(Some(ApiCredentials::ApiKey(key)));
    }
    match (client_id.filter(|s| !s.is_empty()), client_secret.filter(|s| !s.is_empty())) {
        (Some(client_id), Some(client_secret)) => Ok(Some(ApiCredentials::OAuth { client_id, client_secret })),
        (None, None) => Ok(None),
        _ => bail!("both an OAuth client id and client secret are required"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let settings = Settings::merge(Cli::default(), FileConfig::default()).unwrap();
        assert_eq!(settings.storage, "file://state.json");
        assert_eq!(settings.server.listen, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(settings.gate, GateConfig::default());
        assert!(settings.sync.is_none());
        assert!(!settings.debug);
        assert_eq!(settings.log_format, LogFormat::Text);
    }

    #[test]
    fn flags_override_file() {
        let cli = Cli {
            storage: Some("file:///var/lib/tailpol/state.json".into()),
            ..Cli::default()
        };
        let file = FileConfig {
            storage: Some("s3://bucket".into()),
            s3_region: Some("eu-west-1".into()),
            ..FileConfig::default()
        };
        let settings = Settings::merge(cli, file).unwrap();
        assert_eq!(settings.storage, "file:///var/lib/tailpol/state.json");
        assert_eq!(settings.s3.region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn sync_needs_tailnet_and_credentials() {
        let cli = Cli { tailnet: Some("example.com".into()), ..Cli::default() };
        assert!(Settings::merge(cli, FileConfig::default()).unwrap().sync.is_none());

        let cli = Cli { api_key: Some("tskey-api".into()), ..Cli::default() };
        assert!(Settings::merge(cli, FileConfig::default()).unwrap().sync.is_none());

        let cli = Cli {
            tailnet: Some("example.com".into()),
            api_key: Some("tskey-api".into()),
            sync_interval: Some(5),
            ..Cli::default()
        };
        let sync = Settings::merge(cli, FileConfig::default()).unwrap().sync.unwrap();
        assert_eq!(sync.tailnet, "example.com");
        assert_eq!(sync.interval, Duration::from_secs(5));
        assert_eq!(sync.push_timeout, DEFAULT_PUSH_TIMEOUT);
        assert_eq!(sync.api_base_url, DEFAULT_API_BASE);
        assert!(matches!(sync.credentials, ApiCredentials::ApiKey(_)));
    }

    #[test]
    fn half_an_oauth_client_is_an_error() {
        let cli = Cli { oauth_client_id: Some("cid".into()), ..Cli::default() };
        assert!(Settings::merge(cli, FileConfig::default()).is_err());
    }

    #[test]
    fn zero_interval_is_an_error() {
        let cli = Cli { sync_interval: Some(0), ..Cli::default() };
        assert!(Settings::merge(cli, FileConfig::default()).is_err());
    }

    #[test]
    fn loads_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
storage = "s3://policies"
s3_endpoint = "http://localhost:9000"
tailnet = "example.com"
oauth_client_id = "cid"
oauth_client_secret = "secret"
capability_namespace = "corp.example/cap/policy"
debug = true
log_format = "json"
"#
        )
        .unwrap();

        let cli = Cli { config: Some(file.path().to_path_buf()), ..Cli::default() };
        let settings = Settings::resolve(cli).unwrap();
        assert_eq!(settings.storage, "s3://policies");
        assert_eq!(settings.s3.endpoint.as_deref(), Some("http://localhost:9000"));
        assert_eq!(settings.gate.namespace, "corp.example/cap/policy");
        assert!(settings.debug);
        assert!(settings.server.debug);
        assert_eq!(settings.log_format, LogFormat::Json);
        assert!(matches!(settings.sync.unwrap().credentials, ApiCredentials::OAuth { .. }));
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "stroage = \"file://x\"").unwrap();
        assert!(FileConfig::load(file.path()).is_err());
    }
}
