//! `DocumentStore` implementation backed by PostgreSQL.

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use serde_json::Value;
use sqlx_core::query_as::query_as;
use sqlx_postgres::{PgPool, Postgres};
use storefront_storage::{
    Document, DocumentStore, DocumentStream, ListQuery, SortDirection, StorageError,
    is_valid_field_name,
};
use tracing::{debug, instrument};

use crate::config::PostgresConfig;
use crate::error::map_query_error;
use crate::pool::connect;
use crate::schema::ensure_schema;

// Documents without the order field sort last in both directions. The "C"
// collation compares bytes, matching the in-memory backend.
const LIST_ASC_SQL: &str = "SELECT id, data FROM documents WHERE collection = $1 \
     ORDER BY data->>($2::text) COLLATE \"C\" ASC NULLS LAST, id ASC";
const LIST_DESC_SQL: &str = "SELECT id, data FROM documents WHERE collection = $1 \
     ORDER BY data->>($2::text) COLLATE \"C\" DESC NULLS LAST, id ASC";
const GET_SQL: &str = "SELECT id, data FROM documents WHERE collection = $1 AND id = $2";
const UPSERT_SQL: &str = "INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3) \
     ON CONFLICT (collection, id) DO UPDATE SET data = EXCLUDED.data, updated_at = now()";

/// PostgreSQL document store.
#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Connects to the database and prepares the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created or schema setup fails.
    pub async fn new(config: PostgresConfig) -> Result<Self, StorageError> {
        let pool = connect(&config).await?;
        if config.ensure_schema {
            ensure_schema(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// Inserts or replaces a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[instrument(skip(self, document), fields(collection = %collection, id = %document.id))]
    pub async fn put_document(
        &self,
        collection: &str,
        document: &Document,
    ) -> Result<(), StorageError> {
        sqlx_core::query::query(UPSERT_SQL)
            .bind(collection)
            .bind(&document.id)
            .bind(Value::Object(document.fields.clone()))
            .execute(&self.pool)
            .await
            .map_err(map_query_error)?;
        Ok(())
    }
}

fn list_sql(direction: SortDirection) -> &'static str {
    match direction {
        SortDirection::Asc => LIST_ASC_SQL,
        SortDirection::Desc => LIST_DESC_SQL,
    }
}

fn row_to_document(id: String, data: Value) -> Result<Document, StorageError> {
    Document::from_value(id.clone(), data)
        .ok_or_else(|| StorageError::internal(format!("document {id} is not a JSON object")))
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    fn list_collection<'a>(&'a self, query: &'a ListQuery) -> DocumentStream<'a> {
        if !is_valid_field_name(&query.order_by) {
            let err = StorageError::invalid_query(format!(
                "invalid order-by field: {:?}",
                query.order_by
            ));
            return futures_util::stream::once(async move { Err(err) }).boxed();
        }

        debug!(
            collection = %query.collection,
            order_by = %query.order_by,
            direction = query.direction.as_sql(),
            "Streaming collection"
        );

        query_as::<Postgres, (String, Value)>(list_sql(query.direction))
            .bind(query.collection.as_str())
            .bind(query.order_by.as_str())
            .fetch(&self.pool)
            .map_err(map_query_error)
            .and_then(|(id, data)| async move { row_to_document(id, data) })
            .boxed()
    }

    #[instrument(skip(self))]
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StorageError> {
        let row: Option<(String, Value)> = query_as(GET_SQL)
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_query_error)?;

        row.map(|(id, data)| row_to_document(id, data)).transpose()
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_sql_follows_direction() {
        assert!(list_sql(SortDirection::Asc).contains("ASC NULLS LAST"));
        assert!(list_sql(SortDirection::Desc).contains("DESC NULLS LAST"));
    }

    #[test]
    fn test_list_sql_orders_by_bytes() {
        for direction in [SortDirection::Asc, SortDirection::Desc] {
            assert!(list_sql(direction).contains(r#"COLLATE "C""#));
        }
    }

    #[test]
    fn test_row_to_document_requires_object() {
        let doc = row_to_document("c1".into(), json!({"name": "Books"})).unwrap();
        assert_eq!(doc.get_str("name"), Some("Books"));
        assert!(row_to_document("c2".into(), json!("Books")).is_err());
    }
}
