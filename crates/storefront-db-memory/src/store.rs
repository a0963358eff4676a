use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::StreamExt;
use serde_json::Value;
use storefront_storage::{
    Document, DocumentStore, DocumentStream, ListQuery, SortDirection, StorageError,
};

type Collection = DashMap<String, Document>;

/// In-memory document store.
///
/// Collections are created on first insert. Listings take a snapshot of the
/// collection, so a concurrent writer never blocks a reader.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDocumentStore {
    collections: Arc<DashMap<String, Arc<Collection>>>,
}

impl InMemoryDocumentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a document.
    pub fn insert_document(&self, collection: &str, document: Document) {
        let coll = self
            .collections
            .entry(collection.to_string())
            .or_default()
            .clone();
        coll.insert(document.id.clone(), document);
    }

    /// Inserts or replaces a document given as a JSON object.
    pub fn insert_value(
        &self,
        collection: &str,
        id: &str,
        value: Value,
    ) -> Result<(), StorageError> {
        let document = Document::from_value(id, value).ok_or_else(|| {
            StorageError::invalid_query(format!("{collection}/{id}: document must be a JSON object"))
        })?;
        self.insert_document(collection, document);
        Ok(())
    }

    /// Removes a document, returning it if present.
    pub fn remove_document(&self, collection: &str, id: &str) -> Option<Document> {
        self.collections
            .get(collection)
            .and_then(|coll| coll.remove(id).map(|(_, doc)| doc))
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, |c| c.len())
    }

    /// Returns `true` if the collection holds no documents.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn snapshot(&self, query: &ListQuery) -> Vec<Document> {
        let Some(coll) = self.collections.get(&query.collection).map(|c| c.clone()) else {
            return Vec::new();
        };
        let mut docs: Vec<Document> = coll.iter().map(|entry| entry.value().clone()).collect();
        docs.sort_by(|a, b| {
            let ord = compare_field(a.get(&query.order_by), b.get(&query.order_by));
            let ord = match query.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            // Missing fields always sort last, whatever the direction.
            match (a.get(&query.order_by), b.get(&query.order_by)) {
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                _ => ord.then_with(|| a.id.cmp(&b.id)),
            }
        });
        docs
    }
}

/// Orders JSON values: numbers, then strings, then booleans, then the rest.
fn compare_field(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            Some(Value::Number(_)) => 0,
            Some(Value::String(_)) => 1,
            Some(Value::Bool(_)) => 2,
            Some(_) => 3,
            None => 4,
        }
    }
    match (a, b) {
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn list_collection<'a>(&'a self, query: &'a ListQuery) -> DocumentStream<'a> {
        // Deferred so the snapshot is taken when the stream is first polled.
        futures_util::stream::once(async move { self.snapshot(query) })
            .flat_map(|docs| futures_util::stream::iter(docs.into_iter().map(Ok)))
            .boxed()
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StorageError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|coll| coll.get(id).map(|doc| doc.value().clone())))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use serde_json::json;

    async fn names(store: &InMemoryDocumentStore, query: &ListQuery) -> Vec<Option<String>> {
        let docs: Vec<Document> = store.list_collection(query).try_collect().await.unwrap();
        docs.iter()
            .map(|d| d.get_str("name").map(str::to_owned))
            .collect()
    }

    #[tokio::test]
    async fn test_list_orders_ascending_regardless_of_insert_order() {
        let store = InMemoryDocumentStore::new();
        store.insert_value("categories", "b", json!({"name": "Toys"})).unwrap();
        store.insert_value("categories", "a", json!({"name": "Books"})).unwrap();
        store.insert_value("categories", "c", json!({"name": "Garden"})).unwrap();

        let got = names(&store, &ListQuery::ascending("categories", "name")).await;
        assert_eq!(
            got,
            vec![
                Some("Books".to_string()),
                Some("Garden".to_string()),
                Some("Toys".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_list_descending_keeps_missing_fields_last() {
        let store = InMemoryDocumentStore::new();
        store.insert_value("categories", "x", json!({"label": "none"})).unwrap();
        store.insert_value("categories", "a", json!({"name": "Books"})).unwrap();
        store.insert_value("categories", "b", json!({"name": "Toys"})).unwrap();

        let query = ListQuery::new("categories", "name", SortDirection::Desc);
        let got = names(&store, &query).await;
        assert_eq!(
            got,
            vec![Some("Toys".to_string()), Some("Books".to_string()), None]
        );
    }

    #[tokio::test]
    async fn test_list_compares_names_bytewise() {
        let store = InMemoryDocumentStore::new();
        store.insert_value("categories", "1", json!({"name": "apple"})).unwrap();
        store.insert_value("categories", "2", json!({"name": "Books"})).unwrap();

        let got = names(&store, &ListQuery::ascending("categories", "name")).await;
        assert_eq!(
            got,
            vec![Some("Books".to_string()), Some("apple".to_string())]
        );
    }

    #[tokio::test]
    async fn test_list_unknown_collection_is_empty() {
        let store = InMemoryDocumentStore::new();
        let docs: Vec<Document> = store
            .list_collection(&ListQuery::ascending("products", "name"))
            .try_collect()
            .await
            .unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_get_document_and_remove() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_value("users", "u1", json!({"email": "a@example.com"}))
            .unwrap();

        let doc = store.get_document("users", "u1").await.unwrap().unwrap();
        assert_eq!(doc.get_str("email"), Some("a@example.com"));
        assert!(store.get_document("users", "u2").await.unwrap().is_none());

        assert!(store.remove_document("users", "u1").is_some());
        assert!(store.is_empty("users"));
    }

    #[test]
    fn test_insert_value_rejects_non_object() {
        let store = InMemoryDocumentStore::new();
        assert!(store.insert_value("users", "u1", json!([1, 2])).is_err());
    }
}
