use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::traits::PersistenceBackend;

/// In-memory persistence backend.
///
/// Intended for tests and embedding. Saves can be made to fail on demand to
/// exercise the store's persistence-fault path.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    blob: Mutex<Option<Vec<u8>>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryBackend {
    /// Create an empty backend (nothing saved yet).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend that already holds `bytes`.
    pub fn with_contents(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            blob: Mutex::new(Some(bytes.into())),
            ..Self::default()
        }
    }

    /// Make every subsequent `save` fail (or succeed again).
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// The currently stored bytes, if any.
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.blob.lock().expect("lock poisoned").clone()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceBackend for MemoryBackend {
    async fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.contents())
    }

    async fn save(&self, bytes: &[u8]) -> StoreResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("memory backend refused write".into()));
        }
        *self.blob.lock().expect("lock poisoned") = Some(bytes.to_vec());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_until_saved() {
        let backend = MemoryBackend::new();
        assert!(backend.load().await.unwrap().is_none());
        backend.save(b"{}").await.unwrap();
        assert_eq!(backend.load().await.unwrap().unwrap(), b"{}");
        assert_eq!(backend.save_count(), 1);
    }

    #[tokio::test]
    async fn failing_saves_keep_old_contents() {
        let backend = MemoryBackend::with_contents("old");
        backend.set_fail_saves(true);
        assert!(backend.save(b"new").await.is_err());
        assert_eq!(backend.contents().unwrap(), b"old");
        assert_eq!(backend.save_count(), 0);

        backend.set_fail_saves(false);
        backend.save(b"new").await.unwrap();
        assert_eq!(backend.contents().unwrap(), b"new");
    }
}
