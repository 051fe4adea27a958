//! The document store: single owner of the in-memory policy document.
//!
//! Readers share a `RwLock`; every mutation takes the write lock, applies the
//! change, serializes the whole document while still holding the lock, then
//! releases it and writes the bytes to the persistence backend before
//! returning. The backend write runs on its own task, so a caller that is
//! cancelled after the commit does not abandon the save.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::document::{self, Document};
use crate::error::{StoreError, StoreResult};
use crate::traits::PersistenceBackend;

struct Inner {
    doc: Document,
    /// Bumped once per committed mutation.
    generation: u64,
}

/// Serializes backend writes and drops snapshots older than the last save.
struct Persister {
    backend: Arc<dyn PersistenceBackend>,
    /// Generation of the newest document durably written to the backend.
    persisted: tokio::sync::Mutex<u64>,
}

/// Concurrency-safe holder of the policy document with persist-on-write.
pub struct DocumentStore {
    inner: RwLock<Inner>,
    persister: Arc<Persister>,
}

impl DocumentStore {
    /// Create an empty store backed by `backend`.
    ///
    /// Call [`Self::load_from_storage`] to pick up previously saved state.
    pub fn new(backend: Arc<dyn PersistenceBackend>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                doc: Document::new(),
                generation: 0,
            }),
            persister: Arc::new(Persister {
                backend,
                persisted: tokio::sync::Mutex::new(0),
            }),
        }
    }

    pub fn backend(&self) -> &Arc<dyn PersistenceBackend> {
        &self.persister.backend
    }

    fn read_lock(&self) -> StoreResult<RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write_lock(&self) -> StoreResult<RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }

    /// The whole document serialized as pretty JSON.
    ///
    /// Never fails: on an internal fault the empty document `{}` is returned.
    pub fn read(&self) -> Vec<u8> {
        let encoded = self.read_lock().and_then(|inner| document::encode(&inner.doc));
        match encoded {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "failed to serialize document");
                b"{}".to_vec()
            }
        }
    }

    /// A deep copy of the current document.
    pub fn snapshot(&self) -> StoreResult<Document> {
        Ok(self.read_lock()?.doc.clone())
    }

    /// Returns `true` if no collection is set.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.read_lock()?.doc.is_empty())
    }

    /// The current value of a top-level collection, or `None` if unset.
    pub fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.read_lock()?.doc.get(key).cloned())
    }

    /// Decode a collection into a typed value.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.get(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Replace a collection and persist the whole document.
    ///
    /// `Value::Null` removes the collection. On a serialization fault the
    /// mutation is rolled back. On a backend fault the mutation stands in
    /// memory and [`StoreError::Persistence`] is returned; the next
    /// successful write catches the backend up.
    pub async fn update_and_persist(&self, key: &str, value: Value) -> StoreResult<()> {
        let (bytes, generation) = {
            let mut inner = self.write_lock()?;
            let previous = if value.is_null() {
                inner.doc.remove(key)
            } else {
                inner.doc.insert(key.to_string(), value)
            };

            match document::encode(&inner.doc) {
                Ok(bytes) => {
                    inner.generation += 1;
                    (bytes, inner.generation)
                }
                Err(e) => {
                    match previous {
                        Some(old) => inner.doc.insert(key.to_string(), old),
                        None => inner.doc.remove(key),
                    };
                    error!(collection = key, error = %e, "failed to serialize document, mutation rejected");
                    return Err(e);
                }
            }
        };

        self.persist(bytes, generation).await
    }

    /// Encode a typed value and store it under `key`.
    pub async fn update_and_persist_as<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        let value = serde_json::to_value(value)?;
        self.update_and_persist(key, value).await
    }

    async fn persist(&self, bytes: Vec<u8>, generation: u64) -> StoreResult<()> {
        let persister = Arc::clone(&self.persister);
        tokio::spawn(async move { persister.persist(bytes, generation).await })
            .await
            .map_err(|e| StoreError::Persistence {
                backend: self.backend().describe(),
                source: Box::new(StoreError::Backend(format!("persist task failed: {e}"))),
            })?
    }

    /// Replace the in-memory document with whatever the backend holds.
    ///
    /// Missing, unreadable, or undecodable state is logged and the store
    /// starts empty; this never fails.
    pub async fn load_from_storage(&self) {
        let storage = self.backend().describe();
        info!(%storage, "loading existing state");

        let bytes = match self.backend().load().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                info!(%storage, "no saved state found, starting empty");
                return;
            }
            Err(e) => {
                warn!(%storage, error = %e, "could not read saved state, starting empty");
                return;
            }
        };

        let doc = match document::decode(&bytes) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(%storage, error = %e, "could not decode saved state, starting empty");
                return;
            }
        };

        match self.write_lock() {
            Ok(mut inner) => {
                info!(%storage, collections = doc.len(), bytes = bytes.len(), "loaded saved state");
                inner.doc = doc;
            }
            Err(e) => warn!(%storage, error = %e, "could not install saved state"),
        }
    }
}

impl Persister {
    async fn persist(&self, bytes: Vec<u8>, generation: u64) -> StoreResult<()> {
        let mut persisted = self.persisted.lock().await;
        if *persisted >= generation {
            debug!(generation, persisted = *persisted, "newer document already persisted, skipping");
            return Ok(());
        }

        match self.backend.save(&bytes).await {
            Ok(()) => {
                *persisted = generation;
                debug!(
                    storage = %self.backend.describe(),
                    generation,
                    bytes = bytes.len(),
                    "persisted document"
                );
                Ok(())
            }
            Err(e) => {
                error!(storage = %self.backend.describe(), error = %e, "failed to persist document");
                Err(StoreError::Persistence {
                    backend: self.backend.describe(),
                    source: Box::new(e),
                })
            }
        }
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("storage", &self.backend().describe())
            .finish_non_exhaustive()
    }
}
