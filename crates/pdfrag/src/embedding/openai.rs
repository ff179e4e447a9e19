use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::schema::OpenAiConfig;
use crate::embedding::{ensure_count, Embedding, EmbeddingBackend};
use crate::error::EmbeddingError;

const PROVIDER: &str = "openai";

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
    batch_size: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(config: &OpenAiConfig) -> Result<Self, EmbeddingError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                EmbeddingError::Config("OPENAI_API_KEY is required for the openai backend".into())
            })?;
        if config.batch_size == 0 {
            return Err(EmbeddingError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            batch_size: config.batch_size,
        })
    }

    fn embed_batch(&self, batch: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: batch,
            })
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: EmbeddingResponse = response
            .json()
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
        into_embeddings(body, batch, &self.model)
    }
}

/// Orders response items by `index` and pairs them with their inputs.
fn into_embeddings(
    body: EmbeddingResponse,
    inputs: &[String],
    requested_model: &str,
) -> Result<Vec<Embedding>, EmbeddingError> {
    ensure_count(inputs.len(), body.data.len())?;

    let model = body.model.unwrap_or_else(|| requested_model.to_string());
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; inputs.len()];
    for item in body.data {
        let slot = slots.get_mut(item.index).ok_or_else(|| {
            EmbeddingError::InvalidResponse(format!("embedding index {} out of range", item.index))
        })?;
        if slot.replace(item.embedding).is_some() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "duplicate embedding index {}",
                item.index
            )));
        }
    }

    slots
        .into_iter()
        .zip(inputs)
        .map(|(vector, text)| {
            let vector = vector.ok_or_else(|| {
                EmbeddingError::InvalidResponse("missing embedding in response".to_string())
            })?;
            Ok(Embedding {
                text: text.clone(),
                vector,
                model: model.clone(),
                provider: PROVIDER.to_string(),
            })
        })
        .collect()
}

impl EmbeddingBackend for OpenAiEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_batch(batch)?);
        }
        ensure_count(texts.len(), out.len())?;
        Ok(out)
    }

    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }
}
