//! Periodic, level-triggered push of the sanitized document.

use std::sync::Arc;
use std::time::Duration;

use tailpol_store::DocumentStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::push::PolicyPusher;
use crate::strip::sanitize;

/// Default time between pushes.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Result of one reconciliation tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The sanitized document was empty; nothing was sent.
    Skipped,
    /// The remote accepted a payload of this many bytes.
    Pushed { bytes: usize },
    /// The snapshot or the push failed. Retried on the next tick.
    Failed(String),
}

/// Keeps the remote policy in step with the local document.
pub struct SyncReconciler {
    store: Arc<DocumentStore>,
    pusher: Arc<dyn PolicyPusher>,
    interval: Duration,
}

impl SyncReconciler {
    pub fn new(store: Arc<DocumentStore>, pusher: Arc<dyn PolicyPusher>, interval: Duration) -> Self {
        Self { store, pusher, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Snapshot, sanitize and push once.
    pub async fn run_once(&self) -> SyncOutcome {
        let snapshot = match self.store.snapshot() {
            Ok(doc) => doc,
            Err(e) => {
                error!(error = %e, "failed to snapshot document for sync");
                return SyncOutcome::Failed(e.to_string());
            }
        };

        let clean = sanitize(&snapshot);
        if clean.is_empty() {
            info!("local state is empty, skipping policy push");
            return SyncOutcome::Skipped;
        }

        let payload = match serde_json::to_vec(&clean) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "failed to serialize sync snapshot");
                return SyncOutcome::Failed(e.to_string());
            }
        };

        let bytes = payload.len();
        match self.pusher.push(payload).await {
            Ok(()) => {
                info!(bytes, "pushed policy to remote");
                SyncOutcome::Pushed { bytes }
            }
            Err(e) => {
                error!(error = %e, "failed to push policy to remote");
                SyncOutcome::Failed(e.to_string())
            }
        }
    }

    /// Run immediately, then once per interval, until `shutdown` turns `true`
    /// or its sender is dropped.
    ///
    /// Ticks never overlap; a slow push delays the next tick rather than
    /// queueing a burst.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = self.interval.as_secs(), "policy sync started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("policy sync stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SyncError, SyncResult};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tailpol_store::MemoryBackend;

    #[derive(Default)]
    struct RecordingPusher {
        payloads: Mutex<Vec<Vec<u8>>>,
        fail: AtomicBool,
    }

    impl RecordingPusher {
        fn pushes(&self) -> Vec<Value> {
            self.payloads
                .lock()
                .unwrap()
                .iter()
                .map(|p| serde_json::from_slice(p).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl PolicyPusher for RecordingPusher {
        async fn push(&self, payload: Vec<u8>) -> SyncResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SyncError::Rejected { status: 503, body: "unavailable".into() });
            }
            self.payloads.lock().unwrap().push(payload);
            Ok(())
        }
    }

    fn setup() -> (Arc<DocumentStore>, Arc<RecordingPusher>, SyncReconciler) {
        let store = Arc::new(DocumentStore::new(Arc::new(MemoryBackend::new())));
        let pusher = Arc::new(RecordingPusher::default());
        let reconciler = SyncReconciler::new(store.clone(), pusher.clone(), Duration::from_millis(20));
        (store, pusher, reconciler)
    }

    #[tokio::test]
    async fn empty_document_is_never_pushed() {
        let (_, pusher, reconciler) = setup();
        assert_eq!(reconciler.run_once().await, SyncOutcome::Skipped);
        assert_eq!(reconciler.run_once().await, SyncOutcome::Skipped);
        assert!(pusher.pushes().is_empty());
    }

    #[tokio::test]
    async fn document_of_only_ids_is_skipped() {
        let (store, pusher, reconciler) = setup();
        store.update_and_persist("id", json!("internal")).await.unwrap();
        assert_eq!(reconciler.run_once().await, SyncOutcome::Skipped);
        assert!(pusher.pushes().is_empty());
    }

    #[tokio::test]
    async fn pushed_acls_carry_no_ids() {
        let (store, pusher, reconciler) = setup();
        store
            .update_and_persist("acls", json!([{"id": "abc", "action": "accept"}]))
            .await
            .unwrap();

        let outcome = reconciler.run_once().await;
        assert!(matches!(outcome, SyncOutcome::Pushed { bytes } if bytes > 0));

        let pushes = pusher.pushes();
        assert_eq!(pushes, vec![json!({"acls": [{"action": "accept"}]})]);
        // the local copy keeps its ids
        assert_eq!(store.get("acls").unwrap().unwrap()[0]["id"], "abc");
    }

    #[tokio::test]
    async fn push_failure_is_reported_and_retried_next_tick() {
        let (store, pusher, reconciler) = setup();
        store.update_and_persist("groups", json!({"group:eng": ["a@b.c"]})).await.unwrap();

        pusher.fail.store(true, Ordering::SeqCst);
        assert!(matches!(reconciler.run_once().await, SyncOutcome::Failed(_)));
        assert!(pusher.pushes().is_empty());

        pusher.fail.store(false, Ordering::SeqCst);
        assert!(matches!(reconciler.run_once().await, SyncOutcome::Pushed { .. }));
        assert_eq!(pusher.pushes().len(), 1);
    }

    #[tokio::test]
    async fn spawned_loop_pushes_immediately_and_stops_on_shutdown() {
        let (store, pusher, reconciler) = setup();
        store.update_and_persist("settings", json!({"disableIPv4": true})).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = reconciler.spawn(rx);

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!pusher.pushes().is_empty(), "first tick runs without waiting");

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(pusher.pushes().len() >= 2);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn dropping_the_sender_stops_the_loop() {
        let (_, _, reconciler) = setup();
        let (tx, rx) = watch::channel(false);
        let handle = reconciler.spawn(rx);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
