//! The policy document: a dynamically typed JSON tree keyed by collection.
//!
//! The store imposes no schema. Each resource handler decodes its own
//! collection into a typed value and encodes it back before writing.

use serde_json::{Map, Value};

use crate::error::StoreResult;

/// The whole application state. Top-level keys are collection names.
pub type Document = Map<String, Value>;

/// Encode a document the way it is persisted: pretty JSON plus a trailing newline.
pub fn encode(doc: &Document) -> StoreResult<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(doc)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode persisted bytes into a document.
///
/// The root must be a JSON object; `null` decodes to an empty document.
pub fn decode(bytes: &[u8]) -> StoreResult<Document> {
    let doc: Option<Document> = serde_json::from_slice(bytes)?;
    Ok(doc.unwrap_or_default())
}
