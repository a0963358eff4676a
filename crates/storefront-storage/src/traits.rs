//! Storage traits for the document store abstraction.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::StorageError;
use crate::types::{Document, ListQuery};

/// A lazy, ordered stream of documents produced by a collection listing.
///
/// Backend failures surface as `Err` items; an empty stream means the
/// collection matched nothing.
pub type DocumentStream<'a> = BoxStream<'a, Result<Document, StorageError>>;

/// The contract every document store backend implements.
///
/// Implementations are long-lived and shared between concurrent requests,
/// so they must be thread-safe (`Send + Sync`) and provide their own
/// per-operation atomicity.
///
/// # Example
///
/// ```ignore
/// use storefront_storage::{DocumentStore, StorageError, Document};
///
/// async fn user_email(store: &dyn DocumentStore, uid: &str) -> Result<Option<String>, StorageError> {
///     let user = store.get_document("users", uid).await?;
///     Ok(user.and_then(|doc| doc.get_str("email").map(str::to_owned)))
/// }
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Lists every document of a collection in the requested order.
    ///
    /// The stream is lazy: no backend work is guaranteed to happen until it
    /// is polled, and dropping it cancels the remaining work.
    fn list_collection<'a>(&'a self, query: &'a ListQuery) -> DocumentStream<'a>;

    /// Reads a single document by collection and id.
    ///
    /// Returns `None` if the document does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing
    /// documents.
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StorageError>;

    /// Returns the name of this backend for logging.
    fn backend_name(&self) -> &'static str;
}
