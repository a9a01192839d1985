//! OpenAI-compatible embedding provider
//!
//! Any server exposing `/v1/embeddings` works; the base URL comes from
//! `OPENAI_BASE_URL`.

use super::{Embedding, EmbeddingProvider};
use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub struct OpenAIEmbedding {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingsResponse {
    /// Rows may arrive out of order; place each one by its index
    fn into_ordered(self, expected: usize) -> Result<Vec<Embedding>> {
        let mut slots: Vec<Option<Embedding>> = vec![None; expected];
        for row in self.data {
            let slot = slots
                .get_mut(row.index)
                .with_context(|| format!("embedding index {} out of range", row.index))?;
            *slot = Some(Embedding {
                values: row.embedding,
            });
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| slot.with_context(|| format!("missing embedding for input {}", i)))
            .collect()
    }
}

impl OpenAIEmbedding {
    pub fn new(client: Client, base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAIEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.embed_batch(&[text])
            .await?
            .pop()
            .context("OpenAI returned no embedding")
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingsRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI embeddings API returned {}: {}", status, body);
        }

        let body: EmbeddingsResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI embeddings response")?;

        body.into_ordered(texts.len())
    }

    fn model(&self) -> &str {
        &self.model
    }
}
