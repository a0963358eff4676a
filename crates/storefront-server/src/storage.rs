//! Document store selection.

use std::sync::Arc;

use anyhow::Context;
use storefront_db_memory::{InMemoryDocumentStore, load_seed_file};
use storefront_storage::DynDocumentStore;

use crate::config::{StorageBackend, StorageConfig};

/// Creates the configured document store.
///
/// The memory backend is seeded from `storage.seed_file` when set.
pub async fn create_document_store(config: &StorageConfig) -> anyhow::Result<DynDocumentStore> {
    match config.backend {
        StorageBackend::Memory => {
            let store = InMemoryDocumentStore::new();
            if let Some(path) = &config.seed_file {
                load_seed_file(&store, path)
                    .with_context(|| format!("loading seed file {}", path.display()))?;
            } else {
                tracing::warn!("Memory document store without seed data; listings will be empty");
            }
            Ok(Arc::new(store))
        }
        StorageBackend::Postgres => {
            let store = storefront_db_postgres::create_document_store(
                config.postgres.to_backend_config(),
            )
            .await
            .context("connecting to PostgreSQL")?;
            tracing::info!("PostgreSQL document store ready");
            Ok(store)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use std::io::Write;
    use storefront_storage::{Document, ListQuery};

    #[tokio::test]
    async fn test_memory_store_with_seed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"categories": [{{"id": "c1", "name": "Toys"}}, {{"id": "c2", "name": "Books"}}]}}"#
        )
        .unwrap();

        let config = StorageConfig {
            seed_file: Some(file.path().to_path_buf()),
            ..StorageConfig::default()
        };
        let store = create_document_store(&config).await.unwrap();
        assert_eq!(store.backend_name(), "memory");

        let query = ListQuery::ascending("categories", "name");
        let docs: Vec<Document> = store.list_collection(&query).try_collect().await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "c2");
    }

    #[tokio::test]
    async fn test_missing_seed_file_is_an_error() {
        let config = StorageConfig {
            seed_file: Some("/nonexistent/seed.json".into()),
            ..StorageConfig::default()
        };
        assert!(create_document_store(&config).await.is_err());
    }
}
