//! Cached listing payloads and the resources served from them.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use storefront_storage::{Document, ListQuery, SortDirection};

use crate::config::CacheConfig;

/// Where a payload was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadSource {
    Cache,
    Origin,
}

/// List payload: `{success, count, list, source}`.
///
/// `count` always equals `list.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedListing {
    pub success: bool,
    pub count: usize,
    pub list: Vec<String>,
    pub source: PayloadSource,
}

impl CachedListing {
    pub fn from_origin(list: Vec<String>) -> Self {
        Self {
            success: true,
            count: list.len(),
            list,
            source: PayloadSource::Origin,
        }
    }

    /// The same payload relabelled for storage in the cache.
    #[must_use]
    pub fn for_cache(&self) -> Self {
        Self {
            source: PayloadSource::Cache,
            ..self.clone()
        }
    }

    /// `true` if the payload satisfies `count == list.len()`.
    pub fn is_consistent(&self) -> bool {
        self.count == self.list.len()
    }
}

/// A listing resource: which collection to read, which string field to
/// project, and how to cache the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingResource {
    pub cache_key: String,
    pub collection: String,
    pub field: String,
    pub direction: SortDirection,
    pub ttl: Duration,
}

impl ListingResource {
    /// Category names, ascending.
    pub fn categories(ttl: Duration) -> Self {
        Self {
            cache_key: "categories:list".into(),
            collection: "categories".into(),
            field: "name".into(),
            direction: SortDirection::Asc,
            ttl,
        }
    }

    /// Product names, ascending.
    pub fn products(ttl: Duration) -> Self {
        Self {
            cache_key: "products:list".into(),
            collection: "products".into(),
            field: "name".into(),
            direction: SortDirection::Asc,
            ttl,
        }
    }

    /// The origin query; ordered by the projected field.
    pub fn query(&self) -> ListQuery {
        ListQuery::new(self.collection.clone(), self.field.clone(), self.direction)
    }

    /// Projects the field from a document. Absent or non-string values are
    /// skipped.
    pub fn project(&self, document: &Document) -> Option<String> {
        document.get_str(&self.field).map(str::to_owned)
    }
}

/// The listing resources the server exposes.
#[derive(Debug, Clone)]
pub struct Listings {
    pub categories: ListingResource,
    pub products: ListingResource,
}

impl Listings {
    pub fn from_config(cache: &CacheConfig) -> Self {
        Self {
            categories: ListingResource::categories(cache.categories_ttl()),
            products: ListingResource::products(cache.products_ttl()),
        }
    }
}

impl Default for Listings {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// Cache key for a user's profile document.
pub fn user_cache_key(subject_id: &str) -> String {
    format!("user:{subject_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let listing = CachedListing::from_origin(vec!["Books".into(), "Toys".into()]);
        assert_eq!(
            serde_json::to_value(&listing).unwrap(),
            json!({"success": true, "count": 2, "list": ["Books", "Toys"], "source": "origin"})
        );
        assert_eq!(
            serde_json::to_value(listing.for_cache()).unwrap()["source"],
            "cache"
        );
    }

    #[test]
    fn test_consistency_check() {
        let mut listing = CachedListing::from_origin(vec!["a".into()]);
        assert!(listing.is_consistent());
        listing.count = 3;
        assert!(!listing.is_consistent());
    }

    #[test]
    fn test_project_skips_non_strings() {
        let categories = ListingResource::categories(Duration::from_secs(60));
        let named = Document::from_value("c1", json!({"name": "Books"})).unwrap();
        let numeric = Document::from_value("c2", json!({"name": 7})).unwrap();
        let unnamed = Document::from_value("c3", json!({"title": "x"})).unwrap();

        assert_eq!(categories.project(&named).as_deref(), Some("Books"));
        assert!(categories.project(&numeric).is_none());
        assert!(categories.project(&unnamed).is_none());
    }

    #[test]
    fn test_keys() {
        let listings = Listings::default();
        assert_eq!(listings.categories.cache_key, "categories:list");
        assert_eq!(listings.products.cache_key, "products:list");
        assert_eq!(listings.categories.ttl, Duration::from_secs(1800));
        assert_eq!(user_cache_key("u1"), "user:u1");
    }
}
