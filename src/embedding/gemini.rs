//! Google Gemini embedding provider (`batchEmbedContents`)

use super::{Embedding, EmbeddingProvider};
use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub struct GeminiEmbedding {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Embedding>,
}

impl BatchEmbedResponse {
    fn into_embeddings(self, expected: usize) -> Result<Vec<Embedding>> {
        if self.embeddings.len() != expected {
            anyhow::bail!(
                "Gemini returned {} embeddings for {} inputs",
                self.embeddings.len(),
                expected
            );
        }
        Ok(self.embeddings)
    }
}

impl GeminiEmbedding {
    pub fn new(client: Client, base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.trim_start_matches("models/").to_string(),
        }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let embeddings = self.embed_batch(&[text]).await?;
        embeddings
            .into_iter()
            .next()
            .context("No embedding returned")
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/v1beta/models/{}:batchEmbedContents",
            self.base_url, self.model
        );

        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: format!("models/{}", self.model),
                    content: Content {
                        parts: vec![Part {
                            text: text.to_string(),
                        }],
                    },
                })
                .collect(),
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Gemini")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error ({}): {}", status, body);
        }

        let embedding_response: BatchEmbedResponse = response
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        embedding_response.into_embeddings(texts.len())
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_response_keeps_request_order() {
        let body: BatchEmbedResponse = serde_json::from_str(
            r#"{"embeddings":[{"values":[0.5,0.25]},{"values":[1.0,0.0]}]}"#,
        )
        .unwrap();
        let embeddings = body.into_embeddings(2).unwrap();
        assert_eq!(embeddings[0].values, vec![0.5, 0.25]);
        assert_eq!(embeddings[1].values, vec![1.0, 0.0]);
    }

    #[test]
    fn test_missing_embeddings_are_an_error() {
        let body: BatchEmbedResponse = serde_json::from_str("{}").unwrap();
        let err = body.into_embeddings(3).unwrap_err();
        assert_eq!(err.to_string(), "Gemini returned 0 embeddings for 3 inputs");
    }
}
