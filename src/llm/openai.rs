use super::ChatModel;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// OpenAI-compatible chat completions
pub struct OpenAIChat {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAIChat {
    pub fn new(client: Client, base_url: &str, api_key: &str, model: &str, temperature: f32) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature,
        }
    }

    fn request(&self, prompt: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&ChatCompletionRequest {
                model: &self.model,
                messages: vec![Message {
                    role: "user",
                    content: prompt,
                }],
                temperature: self.temperature,
            })
    }
}

#[async_trait::async_trait]
impl ChatModel for OpenAIChat {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let response = self
            .request(prompt)
            .send()
            .await
            .context("Failed to send request to OpenAI")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI chat API error ({}): {}", status, body);
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI chat response")?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("OpenAI returned no completion")
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_bearer_auth_and_single_user_message() {
        let chat = OpenAIChat::new(Client::new(), "https://llm.example.com/", "sk-test", "gpt-4o-mini", 0.2);
        let request = chat.request("What is this?").build().unwrap();

        assert_eq!(request.url().as_str(), "https://llm.example.com/v1/chat/completions");
        assert_eq!(request.headers()["authorization"], "Bearer sk-test");

        let body: serde_json::Value =
            serde_json::from_slice(request.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "What is this?");
        assert_eq!(body["model"], "gpt-4o-mini");
    }

    #[test]
    fn test_empty_choices_parse() {
        let response: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(response.choices.is_empty());
    }
}
