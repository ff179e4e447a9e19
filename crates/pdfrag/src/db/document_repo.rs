//! Repository for the `documents` table.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::{Database, DatabaseError};

/// Free-form metadata attached to a document.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A persisted document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRow {
    pub id: i64,
    pub title: String,
    pub source_path: String,
    pub text: String,
    pub content_hash: String,
    pub metadata: Metadata,
    pub ingest_source: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The fields a caller supplies when saving a document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub source_path: String,
    pub text: String,
    pub content_hash: String,
    pub metadata: Metadata,
    pub ingest_source: Option<String>,
}

/// Result of [`insert_or_get`].
#[derive(Debug, Clone)]
pub struct Inserted {
    pub row: DocumentRow,
    /// False when a row with the same content hash already existed.
    pub inserted: bool,
}

const COLUMNS: &str =
    "id, title, source_path, text, content_hash, metadata, ingest_source, created_at";

impl DocumentRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let metadata: Option<String> = row.get("metadata")?;
        let metadata = metadata
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    5,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?
            .unwrap_or_default();

        let created_at: String = row.get("created_at")?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    7,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;

        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            source_path: row.get("source_path")?,
            text: row.get("text")?,
            content_hash: row.get("content_hash")?,
            metadata,
            ingest_source: row.get("ingest_source")?,
            created_at,
        })
    }
}

/// Inserts a document. When the content hash is already present the existing
/// row is returned and nothing is written.
pub fn insert_or_get(db: &Database, doc: &NewDocument) -> Result<Inserted, DatabaseError> {
    let metadata =
        serde_json::to_string(&doc.metadata).map_err(|e| DatabaseError::Serialization {
            column: "metadata",
            source: e,
        })?;
    let now = Utc::now().to_rfc3339();

    db.with_conn(|conn| {
        let changed = conn.execute(
            "INSERT INTO documents (title, source_path, text, content_hash, metadata, ingest_source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(content_hash) DO NOTHING",
            params![
                doc.title,
                doc.source_path,
                doc.text,
                doc.content_hash,
                metadata,
                doc.ingest_source,
                now,
            ],
        )?;

        let row = query_one(conn, "content_hash", &doc.content_hash)?.ok_or_else(|| {
            DatabaseError::Sqlite(rusqlite::Error::QueryReturnedNoRows)
        })?;

        Ok(Inserted {
            row,
            inserted: changed > 0,
        })
    })
}

/// Finds a document by id.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!("SELECT {COLUMNS} FROM documents WHERE id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        Ok(stmt.query_row(params![id], DocumentRow::from_row).optional()?)
    })
}

/// Finds the newest document with the given title.
pub fn find_by_title(db: &Database, title: &str) -> Result<Option<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| query_one(conn, "title", title))
}

/// Finds the newest document ingested from the given path.
pub fn find_by_source_path(
    db: &Database,
    source_path: &str,
) -> Result<Option<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| query_one(conn, "source_path", source_path))
}

/// Finds the document with the given content hash.
pub fn find_by_hash(db: &Database, hash: &str) -> Result<Option<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| query_one(conn, "content_hash", hash))
}

/// Lists documents, newest first.
pub fn list(db: &Database, limit: u32, offset: u32) -> Result<Vec<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        let sql =
            format!("SELECT {COLUMNS} FROM documents ORDER BY id DESC LIMIT ?1 OFFSET ?2");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit, offset], DocumentRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Deletes a document and, through the foreign key, its embeddings.
/// Returns whether a row was removed.
pub fn delete(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    })
}

/// Counts stored documents.
#[cfg(test)]
pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))?;
        Ok(n.max(0) as u64)
    })
}

// `column` is always one of the fixed names above, never user input.
fn query_one(
    conn: &Connection,
    column: &str,
    value: &str,
) -> Result<Option<DocumentRow>, DatabaseError> {
    let sql = format!("SELECT {COLUMNS} FROM documents WHERE {column} = ?1 ORDER BY id DESC LIMIT 1");
    let mut stmt = conn.prepare(&sql)?;
    Ok(stmt.query_row(params![value], DocumentRow::from_row).optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_doc(title: &str, path: &str, hash: &str) -> NewDocument {
        let mut metadata = Metadata::new();
        metadata.insert("file_size".to_string(), serde_json::json!(1024));
        NewDocument {
            title: title.to_string(),
            source_path: path.to_string(),
            text: format!("text of {title}"),
            content_hash: hash.to_string(),
            metadata,
            ingest_source: Some("watcher".to_string()),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = Database::open_in_memory().unwrap();
        let saved = insert_or_get(&db, &new_doc("report", "/docs/report.pdf", "h1")).unwrap();
        assert!(saved.inserted);

        let by_id = find_by_id(&db, saved.row.id).unwrap().unwrap();
        assert_eq!(by_id.title, "report");
        assert_eq!(by_id.metadata["file_size"], serde_json::json!(1024));
        assert_eq!(by_id.ingest_source.as_deref(), Some("watcher"));

        assert!(find_by_title(&db, "report").unwrap().is_some());
        assert!(find_by_source_path(&db, "/docs/report.pdf").unwrap().is_some());
        assert!(find_by_hash(&db, "h1").unwrap().is_some());
        assert!(find_by_hash(&db, "missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_hash_returns_existing_row() {
        let db = Database::open_in_memory().unwrap();
        let first = insert_or_get(&db, &new_doc("a", "/a.pdf", "same")).unwrap();
        let second = insert_or_get(&db, &new_doc("b", "/b.pdf", "same")).unwrap();

        assert!(first.inserted);
        assert!(!second.inserted);
        assert_eq!(first.row.id, second.row.id);
        assert_eq!(second.row.title, "a");
        assert_eq!(count(&db).unwrap(), 1);
    }

    #[test]
    fn test_ids_are_monotonic_and_list_is_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let a = insert_or_get(&db, &new_doc("a", "/a.pdf", "h1")).unwrap();
        let b = insert_or_get(&db, &new_doc("b", "/b.pdf", "h2")).unwrap();
        assert!(b.row.id > a.row.id);

        let rows = list(&db, 10, 0).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title, "b");
    }

    #[test]
    fn test_delete() {
        let db = Database::open_in_memory().unwrap();
        let saved = insert_or_get(&db, &new_doc("a", "/a.pdf", "h1")).unwrap();
        assert!(delete(&db, saved.row.id).unwrap());
        assert!(!delete(&db, saved.row.id).unwrap());
        assert!(find_by_id(&db, saved.row.id).unwrap().is_none());
    }
}
