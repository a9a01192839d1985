pub mod gemini;
pub mod ollama;
pub mod openai;

use crate::config::{Config, Provider};
use anyhow::Result;
use serde::Deserialize;
use std::sync::Arc;

/// Embedding vector result
#[derive(Debug, Clone, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

/// Embedding provider trait
///
/// The same provider must embed both indexed chunks and queries so that
/// both live in one vector space.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding>;
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>>;
    fn model(&self) -> &str;
}

/// Build the embedding provider selected by the configuration.
pub fn from_config(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let client = config.http_client()?;
    let model = &config.embedding.model;
    let endpoints = &config.endpoints;

    let provider: Arc<dyn EmbeddingProvider> = match config.embedding.provider {
        Provider::Ollama => Arc::new(ollama::OllamaEmbedding::new(
            client,
            &endpoints.ollama_host,
            model,
        )),
        Provider::OpenAI => Arc::new(openai::OpenAIEmbedding::new(
            client,
            &endpoints.openai_base_url,
            endpoints.openai_api_key.as_deref().unwrap_or_default(),
            model,
        )),
        Provider::Gemini => Arc::new(gemini::GeminiEmbedding::new(
            client,
            &endpoints.gemini_base_url,
            endpoints.gemini_api_key.as_deref().unwrap_or_default(),
            model,
        )),
    };

    tracing::info!(
        "Using {} embeddings with model {}",
        config.embedding.provider.as_str(),
        provider.model()
    );
    Ok(provider)
}
