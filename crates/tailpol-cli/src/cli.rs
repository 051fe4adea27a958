use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug, Default)]
#[command(
    name = "tailpol",
    about = "tailpol: Tailscale policy file as a capability-gated REST service",
    version
)]
pub struct Cli {
    /// TOML file with defaults for any of the options below
    #[arg(short, long, env = "TAILPOL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Where the policy document lives: file://<path> or s3://<bucket>[/<key>]
    #[arg(long, env = "TAILPOL_STORAGE")]
    pub storage: Option<String>,

    /// Custom S3-compatible endpoint URL
    #[arg(long, env = "TAILPOL_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// S3 region
    #[arg(long, env = "TAILPOL_S3_REGION")]
    pub s3_region: Option<String>,

    /// Address to listen on
    #[arg(long, env = "TAILPOL_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Tailnet whose policy is kept in sync, e.g. example.com
    #[arg(long, env = "TAILPOL_TAILNET")]
    pub tailnet: Option<String>,

    /// Tailscale API access token
    #[arg(long, env = "TAILPOL_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Tailscale OAuth client id
    #[arg(long, env = "TAILPOL_OAUTH_CLIENT_ID")]
    pub oauth_client_id: Option<String>,

    /// Tailscale OAuth client secret
    #[arg(long, env = "TAILPOL_OAUTH_CLIENT_SECRET", hide_env_values = true)]
    pub oauth_client_secret: Option<String>,

    /// Base URL of the Tailscale API
    #[arg(long, env = "TAILPOL_API_BASE_URL")]
    pub api_base_url: Option<String>,

    /// Seconds between policy pushes
    #[arg(long, env = "TAILPOL_SYNC_INTERVAL")]
    pub sync_interval: Option<u64>,

    /// Seconds before a policy push is abandoned
    #[arg(long, env = "TAILPOL_PUSH_TIMEOUT")]
    pub push_timeout: Option<u64>,

    /// Capability namespace holding this service's grants
    #[arg(long, env = "TAILPOL_CAPABILITY_NAMESPACE")]
    pub capability_namespace: Option<String>,

    /// Path of the tailscaled LocalAPI socket
    #[arg(long, env = "TAILPOL_TAILSCALED_SOCKET")]
    pub tailscaled_socket: Option<PathBuf>,

    /// Verbose logs, and the whole document after every change
    #[arg(long, env = "TAILPOL_DEBUG")]
    pub debug: bool,

    /// Log output format
    #[arg(long, env = "TAILPOL_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
