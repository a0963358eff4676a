//! # storefront-storage
//!
//! Document store abstraction for the storefront server.
//!
//! This crate defines the traits and types every document store backend
//! implements. It does not contain any implementations; those live in
//! `storefront-db-memory` and `storefront-db-postgres`.
//!
//! ## Overview
//!
//! The main trait is [`DocumentStore`], which provides:
//! - ordered collection listing (a lazy stream of documents)
//! - point reads by collection and id
//!
//! ## Example
//!
//! ```ignore
//! use futures_util::TryStreamExt;
//! use storefront_storage::{DocumentStore, ListQuery, StorageError};
//!
//! async fn category_names(store: &dyn DocumentStore) -> Result<Vec<String>, StorageError> {
//!     let docs: Vec<_> = store
//!         .list_collection(&ListQuery::ascending("categories", "name"))
//!         .try_collect()
//!         .await?;
//!     Ok(docs.iter().filter_map(|d| d.get_str("name").map(str::to_owned)).collect())
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::{DocumentStream, DocumentStore};
pub use types::{Document, ListQuery, SortDirection, is_valid_field_name};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared document store trait object.
pub type DynDocumentStore = std::sync::Arc<dyn DocumentStore>;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{ErrorCategory, StorageError};
    pub use crate::traits::{DocumentStream, DocumentStore};
    pub use crate::types::{Document, ListQuery, SortDirection};
    pub use crate::{DynDocumentStore, StorageResult};
}
