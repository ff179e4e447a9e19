//! Fixed-size chunking over whitespace tokens.

use crate::error::ConfigError;

/// Splits text into overlapping windows of whitespace-separated tokens.
///
/// Windows are `[start, min(n, start + chunk_size))`; the next window starts
/// `overlap` tokens before the previous one ended. For `n > chunk_size` this
/// gives `1 + ceil((n - chunk_size) / (chunk_size - overlap))` chunks, and the
/// last chunk ends exactly at the end of the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Fails unless `0 <= overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 {
            return Err(ConfigError::Validation {
                message: "chunk_size must be greater than 0".to_string(),
            });
        }
        if overlap >= chunk_size {
            return Err(ConfigError::Validation {
                message: format!(
                    "chunk_overlap ({}) must be smaller than chunk_size ({})",
                    overlap, chunk_size
                ),
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let mut chunks = Vec::new();
        if tokens.is_empty() {
            return chunks;
        }

        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(tokens.len());
            chunks.push(tokens[start..end].join(" "));
            if end == tokens.len() {
                break;
            }
            start = end - self.overlap;
        }
        chunks
    }

    /// Number of chunks [`split`](Self::split) produces for `tokens` tokens.
    pub fn expected_chunks(&self, tokens: usize) -> usize {
        match tokens {
            0 => 0,
            n if n <= self.chunk_size => 1,
            n => 1 + (n - self.chunk_size).div_ceil(self.chunk_size - self.overlap),
        }
    }
}
