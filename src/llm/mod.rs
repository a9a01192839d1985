pub mod gemini;
pub mod ollama;
pub mod openai;

use crate::config::{Config, Provider};
use anyhow::Result;
use std::sync::Arc;

/// A hosted chat model answering one prompt at a time.
///
/// Calls are single-turn: no history is kept between prompts.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
    fn model(&self) -> &str;
}

/// Build the chat model selected by the configuration.
pub fn from_config(config: &Config) -> Result<Arc<dyn ChatModel>> {
    let client = config.http_client()?;
    let chat = &config.chat;
    let endpoints = &config.endpoints;

    let model: Arc<dyn ChatModel> = match chat.provider {
        Provider::Ollama => Arc::new(ollama::OllamaChat::new(
            client,
            &endpoints.ollama_host,
            &chat.model,
            chat.temperature,
        )),
        Provider::OpenAI => Arc::new(openai::OpenAIChat::new(
            client,
            &endpoints.openai_base_url,
            endpoints.openai_api_key.as_deref().unwrap_or_default(),
            &chat.model,
            chat.temperature,
        )),
        Provider::Gemini => Arc::new(gemini::GeminiChat::new(
            client,
            &endpoints.gemini_base_url,
            endpoints.gemini_api_key.as_deref().unwrap_or_default(),
            &chat.model,
            chat.temperature,
        )),
    };

    tracing::info!(
        "Using {} chat model {}",
        chat.provider.as_str(),
        model.model()
    );
    Ok(model)
}
