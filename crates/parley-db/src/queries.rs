use crate::Database;
use crate::models::DocumentRow;
use anyhow::{Result, anyhow};
use chrono::{SecondsFormat, SubsecRound, Utc};
use parley_types::models::Document;
use parley_types::query::Query;
use rusqlite::{Connection, TransactionBehavior};
use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

impl Database {
    // -- Documents --

    /// Insert a new document. The store assigns the id and creation time.
    pub fn insert_document(&self, collection: &str, fields: Map<String, Value>) -> Result<Document> {
        let doc = new_document(collection, fields);
        self.with_conn(|conn| insert_row(conn, &doc))?;
        Ok(doc)
    }

    /// Insert a new document unless one in `collection` already has `key`
    /// equal to `value`. The check and the insert share one transaction.
    /// Returns `None` when a match exists.
    pub fn insert_document_unless_exists(
        &self,
        collection: &str,
        key: &str,
        value: &Value,
        fields: Map<String, Value>,
    ) -> Result<Option<Document>> {
        let query = Query::collection(collection).where_eq(key, value.clone());

        self.with_conn_mut(|conn| {
            // Take the write lock up front so another process can't insert
            // between the check and ours
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let taken = query_documents(&tx, &query)?
                .into_iter()
                .filter_map(|row| row.into_document().ok())
                .any(|doc| query.matches(&doc));
            if taken {
                return Ok(None);
            }

            let doc = new_document(collection, fields);
            insert_row(&tx, &doc)?;
            tx.commit()?;
            Ok(Some(doc))
        })
    }

    pub fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let row = self.with_conn(|conn| query_document(conn, collection, id))?;
        row.map(DocumentRow::into_document).transpose()
    }

    /// All documents of the query's collection matching every equality filter,
    /// oldest first.
    pub fn query_documents(&self, query: &Query) -> Result<Vec<Document>> {
        let rows = self.with_conn(|conn| query_documents(conn, query))?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            match row.into_document() {
                // Filters that can't be pushed into SQL are applied here
                Ok(doc) if query.matches(&doc) => docs.push(doc),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable document: {:#}", e),
            }
        }
        Ok(docs)
    }

    /// Set one field on an existing document. Returns the updated document,
    /// or `None` if it does not exist.
    pub fn update_field(
        &self,
        collection: &str,
        id: &str,
        key: &str,
        value: Value,
    ) -> Result<Option<Document>> {
        self.modify_fields(collection, id, |fields| {
            fields.insert(key.to_string(), value);
        })
    }

    /// Remove one field from an existing document. Removing a field that is
    /// not set is not an error.
    pub fn delete_field(&self, collection: &str, id: &str, key: &str) -> Result<Option<Document>> {
        self.modify_fields(collection, id, |fields| {
            fields.remove(key);
        })
    }

    fn modify_fields<F>(&self, collection: &str, id: &str, f: F) -> Result<Option<Document>>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(row) = query_document(&tx, collection, id)? else {
                return Ok(None);
            };
            let mut doc = row.into_document()?;
            f(&mut doc.fields);

            let encoded = serde_json::to_string(&doc.fields)?;
            let changed = tx.execute(
                "UPDATE documents SET fields = ?1 WHERE id = ?2 AND collection = ?3",
                rusqlite::params![encoded, id, collection],
            )?;
            if changed != 1 {
                return Err(anyhow!("Document {} vanished during update", id));
            }

            tx.commit()?;
            Ok(Some(doc))
        })
    }
}

fn new_document(collection: &str, fields: Map<String, Value>) -> Document {
    Document {
        id: Uuid::new_v4().to_string(),
        collection: collection.to_string(),
        fields,
        created_at: Utc::now().trunc_subsecs(6),
    }
}

fn insert_row(conn: &Connection, doc: &Document) -> Result<()> {
    let encoded = serde_json::to_string(&doc.fields)?;
    let created_at = doc.created_at.to_rfc3339_opts(SecondsFormat::Micros, true);

    conn.execute(
        "INSERT INTO documents (id, collection, fields, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![doc.id, doc.collection, encoded, created_at],
    )?;
    Ok(())
}

fn query_document(conn: &Connection, collection: &str, id: &str) -> Result<Option<DocumentRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, collection, fields, created_at FROM documents WHERE id = ?1 AND collection = ?2",
    )?;

    let row = stmt
        .query_row([id, collection], |row| {
            Ok(DocumentRow {
                id: row.get(0)?,
                collection: row.get(1)?,
                fields: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_documents(conn: &Connection, query: &Query) -> Result<Vec<DocumentRow>> {
    let mut sql =
        String::from("SELECT id, collection, fields, created_at FROM documents WHERE collection = ?1");
    let mut params = vec![SqlValue::Text(query.collection.clone())];

    for filter in &query.filters {
        // SQLite JSON paths have no escape for '"'; such keys are only
        // filtered in Rust
        if filter.field.contains('"') {
            continue;
        }
        let Some(value) = sql_value(&filter.value) else {
            continue;
        };
        params.push(SqlValue::Text(json_path(&filter.field)));
        params.push(value);
        sql.push_str(&format!(
            " AND json_extract(fields, ?{}) = ?{}",
            params.len() - 1,
            params.len()
        ));
    }
    sql.push_str(" ORDER BY created_at, rowid");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok(DocumentRow {
                id: row.get(0)?,
                collection: row.get(1)?,
                fields: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// JSON path addressing a top-level key. Keys may contain spaces ("First name")
/// but not '"'.
fn json_path(field: &str) -> String {
    format!("$.\"{field}\"")
}

/// SQL value `json_extract` yields for a scalar JSON value. `None` for null,
/// arrays and objects, which are only filtered in Rust.
fn sql_value(value: &Value) -> Option<SqlValue> {
    match value {
        Value::String(s) => Some(SqlValue::Text(s.clone())),
        Value::Bool(b) => Some(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real)),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
