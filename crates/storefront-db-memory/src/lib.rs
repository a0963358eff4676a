//! In-memory document store backend for the storefront server.
//!
//! This crate provides an in-memory implementation of the `DocumentStore`
//! trait from `storefront-storage`, using `DashMap` for concurrent access.
//! It backs the development mode of the server and the test suites.
//!
//! # Example
//!
//! ```ignore
//! use storefront_db_memory::InMemoryDocumentStore;
//! use storefront_storage::DocumentStore;
//!
//! let store = InMemoryDocumentStore::new();
//! store.insert_value("categories", "c1", serde_json::json!({"name": "Books"}))?;
//! let doc = store.get_document("categories", "c1").await?;
//! ```

pub mod seed;
pub mod store;

pub use storefront_storage::{DocumentStore, StorageError};

pub use seed::{SeedError, load_seed_file, load_seed_value};
pub use store::InMemoryDocumentStore;

/// Creates a new shared in-memory document store.
pub fn create_document_store() -> storefront_storage::DynDocumentStore {
    std::sync::Arc::new(InMemoryDocumentStore::new())
}
