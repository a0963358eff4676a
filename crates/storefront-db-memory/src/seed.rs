//! Seed data loading for the in-memory store.
//!
//! The seed format is a JSON object keyed by collection name, each holding
//! an array of documents. A document's `id` field becomes its id; documents
//! without one get a positional id (`{collection}-{index}`).
//!
//! ```json
//! {
//!   "categories": [{"id": "c1", "name": "Books"}, {"name": "Toys"}],
//!   "users": [{"id": "uid-1", "email": "ada@example.com", "fullname": "Ada"}]
//! }
//! ```

use std::path::Path;

use serde_json::Value;

use crate::store::InMemoryDocumentStore;

/// Errors raised while loading seed data.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read seed file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid seed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid seed layout: {0}")]
    Layout(String),
}

/// Loads a seed file into the store. Returns the number of documents loaded.
pub fn load_seed_file(store: &InMemoryDocumentStore, path: &Path) -> Result<usize, SeedError> {
    let raw = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let value: Value = serde_json::from_str(&raw)?;
    let count = load_seed_value(store, value)?;
    tracing::info!(path = %path.display(), documents = count, "Seed data loaded");
    Ok(count)
}

/// Loads an already parsed seed object into the store.
pub fn load_seed_value(store: &InMemoryDocumentStore, value: Value) -> Result<usize, SeedError> {
    let Value::Object(collections) = value else {
        return Err(SeedError::Layout("top level must be an object".into()));
    };

    let mut count = 0;
    for (collection, docs) in collections {
        let Value::Array(docs) = docs else {
            return Err(SeedError::Layout(format!(
                "collection '{collection}' must be an array"
            )));
        };
        for (index, mut doc) in docs.into_iter().enumerate() {
            let id = match doc.as_object_mut().and_then(|obj| obj.remove("id")) {
                Some(Value::String(id)) => id,
                Some(other) => other.to_string(),
                None => format!("{collection}-{index}"),
            };
            store
                .insert_value(&collection, &id, doc)
                .map_err(|e| SeedError::Layout(e.to_string()))?;
            count += 1;
        }
    }
    Ok(count)
}
