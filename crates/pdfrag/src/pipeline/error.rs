use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Failed to read metadata for '{path}': {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Conversion failed: {0}")]
    Conversion(#[from] crate::error::ConversionError),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] crate::error::EmbeddingError),

    #[error("Indexing failed: {0}")]
    Index(#[from] crate::error::IndexError),

    #[error("Storage failed: {0}")]
    Store(#[from] crate::db::DatabaseError),

    #[error("Pipeline panicked: {0}")]
    Panicked(String),
}
