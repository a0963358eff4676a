//! Schema management for the PostgreSQL document store.
//!
//! All collections share one table; the `(collection, id)` primary key
//! serves point reads and the collection index serves listings.

use sqlx_postgres::PgPool;
use tracing::{info, instrument};

use crate::error::{PostgresError, Result};

/// Name of the documents table.
pub const DOCUMENTS_TABLE: &str = "documents";

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    data JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (collection, id)
)"#;

const CREATE_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS documents_collection_idx ON documents (collection)";

/// Creates the documents table and its index if they do not exist.
#[instrument(skip(pool))]
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in [CREATE_TABLE_SQL, CREATE_INDEX_SQL] {
        sqlx_core::query::query(statement)
            .execute(pool)
            .await
            .map_err(|e| PostgresError::schema(e.to_string()))?;
    }
    info!(table = DOCUMENTS_TABLE, "Document schema ready");
    Ok(())
}
