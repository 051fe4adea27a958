//! Process wiring: storage, gate, sync and server, in that order.

use std::sync::Arc;

use anyhow::Context;
use tailpol_gate::CapabilityAuthorizer;
use tailpol_server::{AppState, PolicyServer};
use tailpol_store::{DocumentStore, StorageLocation};
use tailpol_sync::{SyncReconciler, TailscaleApi};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{Settings, SyncSettings};

pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let location: StorageLocation = settings
        .storage
        .parse()
        .with_context(|| format!("invalid storage location {:?}", settings.storage))?;
    let backend = location
        .open(&settings.s3)
        .await
        .with_context(|| format!("failed to open storage {location}"))?;
    info!(storage = %location, "using storage backend");

    let store = Arc::new(DocumentStore::new(backend));
    store.load_from_storage().await;

    let authorizer = authorizer(&settings)?;
    info!(namespace = authorizer.namespace(), "capability gate ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync = match &settings.sync {
        Some(sync) => Some(start_sync(sync, store.clone(), shutdown_rx)?),
        None => {
            warn!("no tailnet or API credentials configured, policy sync disabled");
            None
        }
    };

    let server = PolicyServer::new(settings.server.clone(), AppState::new(store, authorizer));
    let served = server.serve(shutdown_signal()).await;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = sync {
        let _ = handle.await;
    }
    served.context("server failed")
}

#[cfg(unix)]
fn authorizer(settings: &Settings) -> anyhow::Result<CapabilityAuthorizer> {
    Ok(settings.gate.tailscale_authorizer())
}

#[cfg(not(unix))]
fn authorizer(_settings: &Settings) -> anyhow::Result<CapabilityAuthorizer> {
    anyhow::bail!("identity lookup through tailscaled requires a unix socket")
}

fn start_sync(
    sync: &SyncSettings,
    store: Arc<DocumentStore>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<JoinHandle<()>> {
    let api = TailscaleApi::new(&sync.api_base_url, &sync.tailnet, sync.credentials.clone(), sync.push_timeout)
        .context("failed to build Tailscale API client")?;
    info!(tailnet = %sync.tailnet, "policy sync enabled");
    Ok(SyncReconciler::new(store, Arc::new(api), sync.interval).spawn(shutdown))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
