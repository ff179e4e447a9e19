//! Versioned schema migrations.
//!
//! Applied versions are recorded in `_migrations`. Each migration and its
//! bookkeeping row commit together, so a failed step leaves the schema at
//! the previous version.

use std::collections::HashSet;

use rusqlite::{params, Connection};

use super::error::DatabaseError;

struct Migration {
    version: u32,
    name: &'static str,
    step: Step,
}

enum Step {
    Sql(&'static str),
    /// Adds a column unless a hand-made or older schema already has it.
    AddColumn {
        table: &'static str,
        column: &'static str,
        definition: &'static str,
    },
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_documents",
        step: Step::Sql(include_str!("sql/001_create_documents.sql")),
    },
    Migration {
        version: 2,
        name: "create_failed_files",
        step: Step::Sql(include_str!("sql/002_create_failed_files.sql")),
    },
    Migration {
        version: 3,
        name: "create_embeddings",
        step: Step::Sql(include_str!("sql/003_create_embeddings.sql")),
    },
    Migration {
        version: 4,
        name: "documents_ingest_source",
        step: Step::AddColumn {
            table: "documents",
            column: "ingest_source",
            definition: "TEXT",
        },
    },
];

/// Applies every migration not yet recorded in `_migrations`.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let applied = applied_versions(conn)?;
    for migration in MIGRATIONS.iter().filter(|m| !applied.contains(&m.version)) {
        apply(conn, migration).map_err(|e| match e {
            DatabaseError::Sqlite(err) => DatabaseError::Migration {
                version: migration.version,
                reason: err.to_string(),
            },
            other => other,
        })?;
    }
    Ok(())
}

fn applied_versions(conn: &Connection) -> Result<HashSet<u32>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT version FROM _migrations")?;
    let versions = stmt
        .query_map([], |r| r.get::<_, u32>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(versions)
}

fn apply(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    match &migration.step {
        Step::Sql(sql) => {
            log::info!("Applying migration v{} ({})", migration.version, migration.name);
            tx.execute_batch(sql)?;
        }
        Step::AddColumn {
            table,
            column,
            definition,
        } => {
            if column_exists(&tx, table, column)? {
                log::debug!(
                    "Migration v{}: {}.{} already present",
                    migration.version,
                    table,
                    column
                );
            } else {
                log::info!("Applying migration v{} ({})", migration.version, migration.name);
                tx.execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN {} {};",
                    table, column, definition
                ))?;
            }
        }
    }
    tx.execute(
        "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
        params![migration.version, migration.name],
    )?;
    tx.commit()?;
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    let mut stmt = conn.prepare("SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2")?;
    Ok(stmt.exists(params![table, column])?)
}
