//! Content store and failure ledger.
//!
//! The pipeline and the watcher only see the [`ContentStore`] and
//! [`FailureLedger`] traits. [`SqliteStore`] implements both on top of the
//! shared [`Database`] handle.

use crate::db::{document_repo, failure_repo, Database, DatabaseError};

pub use crate::db::document_repo::{DocumentRow as DocumentRecord, Metadata, NewDocument};
pub use crate::db::failure_repo::FailureRow as FailureRecord;

/// Outcome of [`ContentStore::save`].
#[derive(Debug, Clone)]
pub enum SaveOutcome {
    /// A new row was written.
    Inserted(DocumentRecord),
    /// A row with the same content hash already existed; nothing was written.
    Existing(DocumentRecord),
}

#[cfg(test)]
impl SaveOutcome {
    pub fn record(&self) -> &DocumentRecord {
        match self {
            SaveOutcome::Inserted(r) | SaveOutcome::Existing(r) => r,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, SaveOutcome::Inserted(_))
    }
}

/// Persists document records.
pub trait ContentStore: Send + Sync {
    fn save(&self, doc: NewDocument) -> Result<SaveOutcome, DatabaseError>;
    fn get_by_id(&self, id: i64) -> Result<Option<DocumentRecord>, DatabaseError>;
    fn get_by_title(&self, title: &str) -> Result<Option<DocumentRecord>, DatabaseError>;
    fn get_by_source_path(&self, path: &str) -> Result<Option<DocumentRecord>, DatabaseError>;
    fn get_by_hash(&self, hash: &str) -> Result<Option<DocumentRecord>, DatabaseError>;
    fn list(&self, limit: u32, offset: u32) -> Result<Vec<DocumentRecord>, DatabaseError>;
    fn delete(&self, id: i64) -> Result<bool, DatabaseError>;
}

/// Per-path retry ledger.
pub trait FailureLedger: Send + Sync {
    /// Records one more failed attempt for `path`.
    fn record_failure(
        &self,
        path: &str,
        error: &str,
        max_attempts: u32,
    ) -> Result<FailureRecord, DatabaseError>;
    fn clear_failures(&self, path: &str) -> Result<bool, DatabaseError>;
    fn is_blacklisted(&self, path: &str) -> Result<bool, DatabaseError>;
    fn get_failure(&self, path: &str) -> Result<Option<FailureRecord>, DatabaseError>;
    fn list_failures(&self) -> Result<Vec<FailureRecord>, DatabaseError>;
}

/// SQLite implementation of both stores.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl ContentStore for SqliteStore {
    fn save(&self, doc: NewDocument) -> Result<SaveOutcome, DatabaseError> {
        let result = document_repo::insert_or_get(&self.db, &doc)?;
        if result.inserted {
            log::debug!("Stored document {} ({})", result.row.id, result.row.title);
            Ok(SaveOutcome::Inserted(result.row))
        } else {
            log::info!(
                "Content hash {} already stored as document {}",
                result.row.content_hash,
                result.row.id
            );
            Ok(SaveOutcome::Existing(result.row))
        }
    }

    fn get_by_id(&self, id: i64) -> Result<Option<DocumentRecord>, DatabaseError> {
        document_repo::find_by_id(&self.db, id)
    }

    fn get_by_title(&self, title: &str) -> Result<Option<DocumentRecord>, DatabaseError> {
        document_repo::find_by_title(&self.db, title)
    }

    fn get_by_source_path(&self, path: &str) -> Result<Option<DocumentRecord>, DatabaseError> {
        document_repo::find_by_source_path(&self.db, path)
    }

    fn get_by_hash(&self, hash: &str) -> Result<Option<DocumentRecord>, DatabaseError> {
        document_repo::find_by_hash(&self.db, hash)
    }

    fn list(&self, limit: u32, offset: u32) -> Result<Vec<DocumentRecord>, DatabaseError> {
        document_repo::list(&self.db, limit, offset)
    }

    fn delete(&self, id: i64) -> Result<bool, DatabaseError> {
        document_repo::delete(&self.db, id)
    }
}

impl FailureLedger for SqliteStore {
    fn record_failure(
        &self,
        path: &str,
        error: &str,
        max_attempts: u32,
    ) -> Result<FailureRecord, DatabaseError> {
        let was_blacklisted = failure_repo::is_blacklisted(&self.db, path)?;
        let record = failure_repo::record(&self.db, path, error, max_attempts)?;

        if record.blacklisted && !was_blacklisted {
            log::warn!(
                "Blacklisted {} after {} failed attempts: {}",
                path,
                record.attempts,
                error
            );
        } else {
            log::info!(
                "Recorded failure {}/{} for {}: {}",
                record.attempts,
                max_attempts,
                path,
                error
            );
        }
        Ok(record)
    }

    fn clear_failures(&self, path: &str) -> Result<bool, DatabaseError> {
        let cleared = failure_repo::clear(&self.db, path)?;
        if cleared {
            log::info!("Cleared failure record for {}", path);
        }
        Ok(cleared)
    }

    fn is_blacklisted(&self, path: &str) -> Result<bool, DatabaseError> {
        failure_repo::is_blacklisted(&self.db, path)
    }

    fn get_failure(&self, path: &str) -> Result<Option<FailureRecord>, DatabaseError> {
        failure_repo::find(&self.db, path)
    }

    fn list_failures(&self) -> Result<Vec<FailureRecord>, DatabaseError> {
        failure_repo::list(&self.db)
    }
}
