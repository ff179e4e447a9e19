//! Repository for chunk vectors in the `embeddings` table.

use chrono::Utc;
use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// One stored chunk vector.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRow {
    pub document_id: i64,
    pub chunk_index: u32,
    pub vector: Vec<f32>,
    pub provider: String,
    pub model: String,
    pub text: String,
}

impl EmbeddingRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let blob: Vec<u8> = row.get("vector")?;
        Ok(Self {
            document_id: row.get("document_id")?,
            chunk_index: row.get("chunk_index")?,
            vector: decode_vector(&blob),
            provider: row.get("provider")?,
            model: row.get("model")?,
            text: row.get("text")?,
        })
    }
}

/// Inserts all rows in one transaction.
pub fn insert_batch(db: &Database, rows: &[EmbeddingRow]) -> Result<usize, DatabaseError> {
    let now = Utc::now().to_rfc3339();
    db.with_transaction(|tx| {
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO embeddings
                 (document_id, chunk_index, vector, dimension, provider, model, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.document_id,
                    row.chunk_index,
                    encode_vector(&row.vector),
                    row.vector.len() as i64,
                    row.provider,
                    row.model,
                    row.text,
                    now,
                ])?;
            }
        }
        Ok(rows.len())
    })
}

/// Loads every stored vector, ordered by document and chunk.
pub fn load_all(db: &Database) -> Result<Vec<EmbeddingRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT document_id, chunk_index, vector, provider, model, text
             FROM embeddings ORDER BY document_id, chunk_index",
        )?;
        let rows = stmt
            .query_map([], EmbeddingRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts the vectors stored for one document.
#[cfg(test)]
pub fn count_for_document(db: &Database, document_id: i64) -> Result<u32, DatabaseError> {
    db.with_conn(|conn| {
        let n: u32 = conn.query_row(
            "SELECT COUNT(*) FROM embeddings WHERE document_id = ?1",
            params![document_id],
            |r| r.get(0),
        )?;
        Ok(n)
    })
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
