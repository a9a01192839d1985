use super::ChatModel;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Ollama chat model (`/api/chat`, non-streaming)
pub struct OllamaChat {
    client: Client,
    host: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
    options: Options,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

impl OllamaChat {
    pub fn new(client: Client, host: &str, model: &str, temperature: f32) -> Self {
        Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
        }
    }
}

#[async_trait::async_trait]
impl ChatModel for OllamaChat {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.host);

        let request = OllamaChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            stream: false,
            options: Options {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama chat API error ({}): {}", status, body);
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .context("Failed to parse Ollama chat response")?;

        Ok(chat_response.message.content)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
