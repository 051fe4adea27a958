//! Policy synchronization for tailpol.
//!
//! Periodically pushes the local policy document to the Tailscale API, with
//! internal identifier fields stripped. Pushes are level-triggered: a failed
//! push is simply retried with fresh state on the next tick.

pub mod error;
pub mod push;
pub mod reconciler;
pub mod strip;

pub use error::{SyncError, SyncResult};
pub use push::{ApiCredentials, PolicyPusher, TailscaleApi, DEFAULT_API_BASE, DEFAULT_PUSH_TIMEOUT};
pub use reconciler::{SyncOutcome, SyncReconciler, DEFAULT_SYNC_INTERVAL};
pub use strip::{sanitize, strip_field, STABLE_ID_FIELD};
