use async_trait::async_trait;

use crate::error::StoreResult;

/// Durable storage for one opaque blob.
///
/// All implementations must satisfy these invariants:
/// - The backend never interprets the bytes it stores.
/// - `save` replaces the whole blob; a later `load` returns exactly those bytes.
/// - A missing blob is `Ok(None)`, not an error.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Read the last saved blob.
    ///
    /// Returns `Ok(None)` if nothing has been saved yet.
    /// Returns `Err` on I/O failure or an unreachable remote.
    async fn load(&self) -> StoreResult<Option<Vec<u8>>>;

    /// Replace the stored blob with `bytes`.
    async fn save(&self, bytes: &[u8]) -> StoreResult<()>;

    /// Human-readable location, used in logs and errors.
    fn describe(&self) -> String;
}
