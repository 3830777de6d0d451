use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Document;

/// Equality predicate on one top-level document field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

impl FieldFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// A collection scoped query made of AND-ed equality filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<FieldFilter>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter::eq(field, value));
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        doc.collection == self.collection
            && self
                .filters
                .iter()
                .all(|f| doc.fields.get(&f.field) == Some(&f.value))
    }
}
