//! Data types shared by all document store backends.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A document as returned by a document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// The document id, unique within its collection.
    pub id: String,
    /// The document fields.
    pub fields: Map<String, Value>,
}

impl Document {
    /// Creates a new document.
    #[must_use]
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Creates a document from a JSON value.
    ///
    /// Returns `None` if the value is not a JSON object.
    #[must_use]
    pub fn from_value(id: impl Into<String>, value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self::new(id, fields)),
            _ => None,
        }
    }

    /// Returns a field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns a field only when it is present and a string.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Consumes the document and returns its fields as a JSON object.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

/// Sort direction for collection listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Returns the SQL keyword for this direction.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// An ordered listing of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// The collection to list.
    pub collection: String,
    /// The field to order by.
    pub order_by: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl ListQuery {
    /// Creates a listing query.
    #[must_use]
    pub fn new(
        collection: impl Into<String>,
        order_by: impl Into<String>,
        direction: SortDirection,
    ) -> Self {
        Self {
            collection: collection.into(),
            order_by: order_by.into(),
            direction,
        }
    }

    /// Creates an ascending listing query.
    #[must_use]
    pub fn ascending(collection: impl Into<String>, order_by: impl Into<String>) -> Self {
        Self::new(collection, order_by, SortDirection::Asc)
    }
}

/// Returns `true` if `name` is usable as a field or collection name.
///
/// Accepts ASCII letters, digits and underscores, not starting with a digit.
#[must_use]
pub fn is_valid_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_str_skips_non_strings() {
        let doc = Document::from_value("1", json!({"name": "Books", "rank": 3})).unwrap();
        assert_eq!(doc.get_str("name"), Some("Books"));
        assert_eq!(doc.get_str("rank"), None);
        assert_eq!(doc.get_str("missing"), None);
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(Document::from_value("1", json!(["a"])).is_none());
        assert!(Document::from_value("1", json!("a")).is_none());
    }

    #[test]
    fn test_field_name_validation() {
        assert!(is_valid_field_name("name"));
        assert!(is_valid_field_name("_created_at2"));
        assert!(!is_valid_field_name(""));
        assert!(!is_valid_field_name("2name"));
        assert!(!is_valid_field_name("name; DROP TABLE documents"));
        assert!(!is_valid_field_name("a.b"));
    }

    #[test]
    fn test_sort_direction_serde() {
        let dir: SortDirection = serde_json::from_str("\"desc\"").unwrap();
        assert_eq!(dir, SortDirection::Desc);
        assert_eq!(SortDirection::default().as_sql(), "ASC");
    }
}
