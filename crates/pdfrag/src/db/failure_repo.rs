//! Repository for the `failed_files` ledger.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::{Database, DatabaseError};

/// Retry ledger entry for one source path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRow {
    pub source_path: String,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub blacklisted: bool,
    pub updated_at: DateTime<Utc>,
}

impl FailureRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let updated_at: String = row.get("updated_at")?;
        let updated_at = DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    4,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;

        Ok(Self {
            source_path: row.get("source_path")?,
            attempts: row.get("attempts")?,
            last_error: row.get("last_error")?,
            blacklisted: row.get("blacklisted")?,
            updated_at,
        })
    }
}

/// Increments the attempt counter for `path` and returns the updated entry.
///
/// The read and the write happen in one transaction. Once blacklisted, an entry stays blacklisted until
/// [`clear`] removes it.
pub fn record(
    db: &Database,
    path: &str,
    error: &str,
    max_attempts: u32,
) -> Result<FailureRow, DatabaseError> {
    let now = Utc::now();

    db.with_transaction(|tx| {
        let previous: Option<(u32, bool)> = tx
            .query_row(
                "SELECT attempts, blacklisted FROM failed_files WHERE source_path = ?1",
                params![path],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        let (prev_attempts, prev_blacklisted) = previous.unwrap_or((0, false));
        let attempts = prev_attempts.saturating_add(1);
        let blacklisted = prev_blacklisted || attempts >= max_attempts;

        tx.execute(
            "INSERT INTO failed_files (source_path, attempts, last_error, blacklisted, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(source_path) DO UPDATE SET
                 attempts = excluded.attempts,
                 last_error = excluded.last_error,
                 blacklisted = excluded.blacklisted,
                 updated_at = excluded.updated_at",
            params![path, attempts, error, blacklisted, now.to_rfc3339()],
        )?;

        Ok(FailureRow {
            source_path: path.to_string(),
            attempts,
            last_error: Some(error.to_string()),
            blacklisted,
            updated_at: now,
        })
    })
}

/// Removes the ledger entry for `path`. Returns whether one existed.
pub fn clear(db: &Database, path: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "DELETE FROM failed_files WHERE source_path = ?1",
            params![path],
        )?;
        Ok(changed > 0)
    })
}

/// Finds the ledger entry for `path`.
pub fn find(db: &Database, path: &str) -> Result<Option<FailureRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT source_path, attempts, last_error, blacklisted, updated_at
             FROM failed_files WHERE source_path = ?1",
        )?;
        Ok(stmt.query_row(params![path], FailureRow::from_row).optional()?)
    })
}

/// Whether `path` is currently blacklisted.
pub fn is_blacklisted(db: &Database, path: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let flag: Option<bool> = conn
            .query_row(
                "SELECT blacklisted FROM failed_files WHERE source_path = ?1",
                params![path],
                |r| r.get(0),
            )
            .optional()?;
        Ok(flag.unwrap_or(false))
    })
}

/// Lists every ledger entry, most recently updated first.
pub fn list(db: &Database) -> Result<Vec<FailureRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT source_path, attempts, last_error, blacklisted, updated_at
             FROM failed_files ORDER BY updated_at DESC, source_path",
        )?;
        let rows = stmt
            .query_map([], FailureRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts_increase_and_blacklist_at_max() {
        let db = Database::open_in_memory().unwrap();
        let path = "/watch/bad.pdf";

        let flags: Vec<(u32, bool)> = (0..3)
            .map(|_| {
                let row = record(&db, path, "boom", 3).unwrap();
                (row.attempts, row.blacklisted)
            })
            .collect();

        assert_eq!(flags, vec![(1, false), (2, false), (3, true)]);
        assert!(is_blacklisted(&db, path).unwrap());
    }

    #[test]
    fn test_blacklist_is_sticky_until_cleared() {
        let db = Database::open_in_memory().unwrap();
        let path = "/watch/bad.pdf";
        record(&db, path, "first", 1).unwrap();
        // A later call with a higher limit must not un-blacklist.
        let row = record(&db, path, "second", 10).unwrap();
        assert!(row.blacklisted);
        assert_eq!(row.attempts, 2);
        assert_eq!(row.last_error.as_deref(), Some("second"));

        assert!(clear(&db, path).unwrap());
        assert!(!is_blacklisted(&db, path).unwrap());
        assert!(find(&db, path).unwrap().is_none());
    }

    #[test]
    fn test_clear_unknown_path() {
        let db = Database::open_in_memory().unwrap();
        assert!(!clear(&db, "/nope.pdf").unwrap());
        assert!(!is_blacklisted(&db, "/nope.pdf").unwrap());
    }

    #[test]
    fn test_list() {
        let db = Database::open_in_memory().unwrap();
        record(&db, "/a.pdf", "e", 10).unwrap();
        record(&db, "/b.pdf", "e", 10).unwrap();
        let rows = list(&db).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.attempts == 1 && !r.blacklisted));
    }
}
