//! Policy document storage for tailpol.
//!
//! This crate owns the single in-memory copy of the policy document and keeps
//! it durable. The document is an untyped JSON tree keyed by collection name;
//! schema lives with the resource handlers that read and write each
//! collection.
//!
//! # Storage Backends
//!
//! All backends implement the [`PersistenceBackend`] trait:
//!
//! - [`FileBackend`] -- one local file, replaced atomically on every save
//! - [`S3Backend`] -- one object in an S3-compatible bucket (feature `s3`)
//! - [`MemoryBackend`] -- in-process store for tests and embedding
//!
//! # Design Rules
//!
//! 1. All reads and writes of the document go through [`DocumentStore`]'s lock.
//! 2. Readers may overlap each other; a writer excludes everyone.
//! 3. Every mutation is persisted before it returns.
//! 4. A failed persist does not roll back the in-memory mutation.
//! 5. Backends never interpret the bytes they store.

pub mod document;
pub mod error;
pub mod file;
pub mod location;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;
pub mod store;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use document::Document;
pub use error::{StoreError, StoreResult};
pub use file::FileBackend;
pub use location::{S3Options, StorageLocation, DEFAULT_OBJECT_KEY};
pub use memory::MemoryBackend;
#[cfg(feature = "s3")]
pub use s3::S3Backend;
pub use store::DocumentStore;
pub use traits::PersistenceBackend;
