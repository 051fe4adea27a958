use std::sync::Arc;

use tailpol_gate::CapabilityAuthorizer;
use tailpol_store::DocumentStore;

/// Shared handles given to every handler and middleware.
#[derive(Clone, Debug)]
pub struct AppState {
    pub store: Arc<DocumentStore>,
    pub authorizer: Arc<CapabilityAuthorizer>,
    pub debug: bool,
}

impl AppState {
    pub fn new(store: Arc<DocumentStore>, authorizer: CapabilityAuthorizer) -> Self {
        Self { store, authorizer: Arc::new(authorizer), debug: false }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}
