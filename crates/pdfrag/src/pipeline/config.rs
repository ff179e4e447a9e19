use crate::config::schema::EmbeddingConfig;
use crate::config::Config;
use crate::embedding::{Chunker, EmbeddingKind};
use crate::error::ConfigError;
use crate::processor::ConverterKind;

/// Backend selection and chunking parameters, resolved once at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub converter: ConverterKind,
    pub embedder: EmbeddingKind,
    pub embedding: EmbeddingConfig,
    pub chunker: Chunker,
    /// Fixed index dimension, 0 to infer it.
    pub index_dimension: usize,
}

impl PipelineConfig {
    /// Fails fast on unknown backend names or invalid chunking.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            converter: config.conversion.backend.parse()?,
            embedder: config.embedding.backend.parse()?,
            embedding: config.embedding.clone(),
            chunker: Chunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?,
            index_dimension: config.index.dimension,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_default_config() {
        let pc = PipelineConfig::from_config(&Config::default()).unwrap();
        assert_eq!(pc.converter, ConverterKind::Lopdf);
        assert_eq!(pc.embedder, EmbeddingKind::Local);
        assert_eq!(pc.chunker.chunk_size(), 700);
        assert_eq!(pc.chunker.overlap(), 50);
    }

    #[test]
    fn test_unknown_backend_fails_fast() {
        let mut config = Config::default();
        config.conversion.backend = "marker".to_string();
        assert!(matches!(
            PipelineConfig::from_config(&config),
            Err(ConfigError::UnknownBackend { .. })
        ));
    }
}
