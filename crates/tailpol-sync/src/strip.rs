//! Removal of internal identifier fields before a document leaves the process.

use serde_json::{Map, Value};
use tailpol_store::Document;

/// Field attached to list items for addressability; never sent upstream.
pub const STABLE_ID_FIELD: &str = "id";

/// A copy of `value` with every object field named `key` removed, at any depth.
///
/// Only field names are matched. String values equal to `key` are kept.
pub fn strip_field(value: &Value, key: &str) -> Value {
    match value {
        Value::Object(map) => Value::Object(strip_map(map, key)),
        Value::Array(items) => Value::Array(items.iter().map(|v| strip_field(v, key)).collect()),
        scalar => scalar.clone(),
    }
}

fn strip_map(map: &Map<String, Value>, key: &str) -> Map<String, Value> {
    map.iter()
        .filter(|(k, _)| k.as_str() != key)
        .map(|(k, v)| (k.clone(), strip_field(v, key)))
        .collect()
}

/// The sync snapshot of a document: [`STABLE_ID_FIELD`] removed everywhere.
///
/// A top-level collection literally named `id` is removed as well.
pub fn sanitize(doc: &Document) -> Document {
    strip_map(doc, STABLE_ID_FIELD)
}
