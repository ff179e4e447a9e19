use sha2::{Digest, Sha256};

use crate::embedding::{Embedding, EmbeddingBackend};
use crate::error::EmbeddingError;

const PROVIDER: &str = "feature-hashing";

/// Deterministic bag-of-words embedder using the hashing trick.
///
/// Each lowercased token is hashed with SHA-256 into a bucket and a sign,
/// and the resulting vector is L2-normalized. Needs no network or model
/// files, so identical text always yields an identical vector.
pub struct HashingEmbedder {
    dimension: usize,
    model: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::Config(
                "embedding dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            model: format!("hashing-{}", dimension),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl EmbeddingBackend for HashingEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|text| Embedding {
                text: text.clone(),
                vector: self.vectorize(text),
                model: self.model.clone(),
                provider: PROVIDER.to_string(),
            })
            .collect())
    }

    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(HashingEmbedder::new(0).is_err());
    }

    #[test]
    fn test_embed_preserves_order_and_length() {
        let embedder = HashingEmbedder::new(64).unwrap();
        let texts = vec!["alpha beta".to_string(), "gamma".to_string(), String::new()];
        let out = embedder.embed(&texts).unwrap();

        assert_eq!(out.len(), 3);
        for (embedding, text) in out.iter().zip(&texts) {
            assert_eq!(&embedding.text, text);
            assert_eq!(embedding.vector.len(), 64);
            assert_eq!(embedding.provider, "feature-hashing");
            assert_eq!(embedding.model, "hashing-64");
        }
        assert!(out[2].vector.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(128).unwrap();
        let a = embedder.vectorize("The quick brown fox");
        let b = embedder.vectorize("the QUICK brown fox!");
        assert_eq!(a, b);
        assert!((dot(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_similar_text_scores_higher() {
        let embedder = HashingEmbedder::new(256).unwrap();
        let query = embedder.vectorize("invoice payment due");
        let close = embedder.vectorize("the invoice payment is due tomorrow");
        let far = embedder.vectorize("mountain hiking trail weather");
        assert!(dot(&query, &close) > dot(&query, &far));
    }

    #[test]
    fn test_empty_input() {
        let embedder = HashingEmbedder::new(8).unwrap();
        assert!(embedder.embed(&[]).unwrap().is_empty());
    }
}
