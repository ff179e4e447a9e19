//! Chunking and embedding backends.

pub mod chunker;
pub mod local;
pub mod openai;

use std::str::FromStr;

use serde::Serialize;

use crate::config::schema::EmbeddingConfig;
use crate::error::{ConfigError, EmbeddingError};

pub use chunker::Chunker;
pub use local::HashingEmbedder;
pub use openai::OpenAiEmbedder;

/// One embedded chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embedding {
    pub text: String,
    pub vector: Vec<f32>,
    pub model: String,
    pub provider: String,
}

/// Turns text chunks into vectors.
///
/// Implementations return exactly one [`Embedding`] per input, in input
/// order. An empty input yields an empty output without contacting the
/// provider.
pub trait EmbeddingBackend: Send + Sync {
    fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError>;

    fn provider(&self) -> &str;

    fn model(&self) -> &str;
}

/// The embedding backends selectable by name in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingKind {
    Local,
    OpenAi,
}

impl EmbeddingKind {
    pub fn build(self, config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingBackend>, EmbeddingError> {
        match self {
            EmbeddingKind::Local => Ok(Box::new(HashingEmbedder::new(config.dimension)?)),
            EmbeddingKind::OpenAi => Ok(Box::new(OpenAiEmbedder::new(&config.openai)?)),
        }
    }
}

impl FromStr for EmbeddingKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "hashing" => Ok(EmbeddingKind::Local),
            "openai" => Ok(EmbeddingKind::OpenAi),
            _ => Err(ConfigError::UnknownBackend {
                kind: "embedding",
                name: s.to_string(),
            }),
        }
    }
}

/// Checks that a backend answered with one vector per input.
pub(crate) fn ensure_count(expected: usize, actual: usize) -> Result<(), EmbeddingError> {
    if expected == actual {
        Ok(())
    } else {
        Err(EmbeddingError::CountMismatch { expected, actual })
    }
}
