use super::{Embedding, EmbeddingProvider};
use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Ollama embedding provider (`/api/embed`, batched)
pub struct OllamaEmbedding {
    client: Client,
    host: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    /// Let the server cut inputs longer than the model context
    truncate: bool,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedding {
    pub fn new(client: Client, host: &str, model: &str) -> Self {
        Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.embed_batch(&[text])
            .await?
            .pop()
            .context("Ollama returned no embedding")
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.host);
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
            truncate: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach Ollama at {}", self.host))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama embed API returned {}: {}", status, body);
        }

        let body: EmbedResponse = response
            .json()
            .await
            .context("Failed to parse Ollama embed response")?;

        if body.embeddings.len() != texts.len() || body.embeddings.iter().any(Vec::is_empty) {
            anyhow::bail!(
                "Ollama model {} returned {} usable embeddings for {} inputs",
                self.model,
                body.embeddings.iter().filter(|e| !e.is_empty()).count(),
                texts.len()
            );
        }

        Ok(body
            .embeddings
            .into_iter()
            .map(|values| Embedding { values })
            .collect())
    }

    fn model(&self) -> &str {
        &self.model
    }
}
