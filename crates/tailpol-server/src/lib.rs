//! HTTP server for tailpol.
//!
//! Serves the policy document as a set of REST collections. Every request
//! passes the capability gate before a handler runs; handlers translate
//! verbs into reads and writes of the [`tailpol_store::DocumentStore`].

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod resources;
pub mod router;
pub mod server;
pub mod state;

pub use config::{ServerConfig, DEFAULT_PORT};
pub use error::{ServerError, ServerResult};
pub use router::build_router;
pub use server::PolicyServer;
pub use state::AppState;
