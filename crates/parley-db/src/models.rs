//! Row types as they come out of SQLite, before JSON decoding.
//! Distinct from parley-types models to keep the DB layer independent.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parley_types::models::Document;

pub struct DocumentRow {
    pub id: String,
    pub collection: String,
    pub fields: String,
    pub created_at: String,
}

impl DocumentRow {
    pub fn into_document(self) -> Result<Document> {
        let fields = serde_json::from_str(&self.fields)
            .with_context(|| format!("corrupt fields on document '{}'", self.id))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .with_context(|| format!("corrupt created_at on document '{}'", self.id))?
            .with_timezone(&Utc);

        Ok(Document {
            id: self.id,
            collection: self.collection,
            fields,
            created_at,
        })
    }
}
