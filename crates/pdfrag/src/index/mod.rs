//! Vector index over chunk embeddings.
//!
//! Vectors are persisted in the `embeddings` table and mirrored in memory.
//! Writers take the write lock, similarity searches share the read lock.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::db::embedding_repo::{self, EmbeddingRow};
use crate::db::Database;
use crate::embedding::Embedding;
use crate::error::IndexError;

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchMatch {
    pub document_id: i64,
    pub chunk_index: u32,
    pub similarity: f32,
    pub text: String,
    pub provider: String,
    pub model: String,
}

/// Stores vectors and answers nearest-neighbour queries.
pub trait IndexStore: Send + Sync {
    /// Adds one vector per chunk for `document_id`, chunk index = position.
    /// Returns the number of vectors written.
    fn add(&self, document_id: i64, embeddings: &[Embedding]) -> Result<usize, IndexError>;

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchMatch>, IndexError>;

    /// The established vector dimension, if any.
    fn dimension(&self) -> Option<usize>;
}

#[derive(Default)]
struct IndexState {
    dimension: Option<usize>,
    entries: Vec<EmbeddingRow>,
}

/// SQLite-backed index with an in-memory copy for brute-force search.
pub struct VectorIndex {
    db: Database,
    state: RwLock<IndexState>,
}

impl VectorIndex {
    /// Loads every stored vector. A non-zero `dimension` fixes the expected
    /// vector length up front; zero takes it from the stored vectors or, on
    /// an empty index, from the first batch added.
    pub fn open(db: Database, dimension: usize) -> Result<Self, IndexError> {
        let entries = embedding_repo::load_all(&db)?;
        let stored = entries.first().map(|e| e.vector.len());

        let dimension = match (dimension, stored) {
            (0, stored) => stored,
            (fixed, Some(stored)) if fixed != stored => {
                return Err(IndexError::DimensionMismatch {
                    expected: fixed,
                    actual: stored,
                })
            }
            (fixed, _) => Some(fixed),
        };

        log::info!(
            "Vector index loaded: {} vectors, dimension {}",
            entries.len(),
            dimension.map_or_else(|| "unset".to_string(), |d| d.to_string())
        );

        Ok(Self {
            db,
            state: RwLock::new(IndexState { dimension, entries }),
        })
    }

    pub fn len(&self) -> usize {
        self.read_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_state(&self) -> RwLockReadGuard<'_, IndexState> {
        match self.state.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Vector index lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, IndexState> {
        match self.state.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Vector index lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl IndexStore for VectorIndex {
    fn add(&self, document_id: i64, embeddings: &[Embedding]) -> Result<usize, IndexError> {
        if embeddings.is_empty() {
            return Ok(0);
        }

        let mut state = self.write_state();
        let expected = state
            .dimension
            .unwrap_or_else(|| embeddings[0].vector.len());
        if let Some(bad) = embeddings.iter().find(|e| e.vector.len() != expected) {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: bad.vector.len(),
            });
        }

        let rows: Vec<EmbeddingRow> = embeddings
            .iter()
            .enumerate()
            .map(|(i, e)| EmbeddingRow {
                document_id,
                chunk_index: i as u32,
                vector: e.vector.clone(),
                provider: e.provider.clone(),
                model: e.model.clone(),
                text: e.text.clone(),
            })
            .collect();

        let written = embedding_repo::insert_batch(&self.db, &rows)?;
        if state.dimension.is_none() {
            log::info!("Vector index dimension established at {}", expected);
            state.dimension = Some(expected);
        }
        state.entries.extend(rows);
        Ok(written)
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchMatch>, IndexError> {
        let state = self.read_state();
        if top_k == 0 || state.entries.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(expected) = state.dimension {
            if query.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }

        let mut matches: Vec<SearchMatch> = state
            .entries
            .iter()
            .map(|entry| SearchMatch {
                document_id: entry.document_id,
                chunk_index: entry.chunk_index,
                similarity: cosine_similarity(query, &entry.vector).max(0.0),
                text: entry.text.clone(),
                provider: entry.provider.clone(),
                model: entry.model.clone(),
            })
            .collect();

        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(top_k);
        Ok(matches)
    }

    fn dimension(&self) -> Option<usize> {
        self.read_state().dimension
    }
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
