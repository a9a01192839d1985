use crate::error::{RagError, RagResult};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Hosted service family used for embeddings or chat completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    OpenAI,
    Gemini,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Ollama => "ollama",
            Provider::OpenAI => "openai",
            Provider::Gemini => "gemini",
        }
    }

    fn default_embedding_model(&self) -> &'static str {
        match self {
            Provider::Ollama => "nomic-embed-text",
            Provider::OpenAI => "text-embedding-3-small",
            Provider::Gemini => "embedding-001",
        }
    }

    fn default_chat_model(&self) -> &'static str {
        match self {
            Provider::Ollama => "llama3.2",
            Provider::OpenAI => "gpt-4o-mini",
            Provider::Gemini => "gemini-1.5-flash-latest",
        }
    }
}

impl FromStr for Provider {
    type Err = RagError;

    fn from_str(s: &str) -> RagResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "openai" => Ok(Provider::OpenAI),
            "gemini" | "google" => Ok(Provider::Gemini),
            other => Err(RagError::Config(format!(
                "unknown provider '{}' (expected ollama, openai or gemini)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: Provider,
    pub model: String,
    /// Texts per embedding request
    pub batch_size: usize,
    /// Embedding requests in flight during indexing
    pub concurrency: usize,
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub provider: Provider,
    pub model: String,
    pub temperature: f32,
}

/// Endpoints and credentials shared by the embedding and chat clients.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub ollama_host: String,
    pub openai_base_url: String,
    pub openai_api_key: Option<String>,
    pub gemini_base_url: String,
    pub gemini_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Parent directory of every repository snapshot
    pub workspace_dir: PathBuf,
    pub clone_timeout: Duration,
    pub request_timeout: Duration,
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding: EmbeddingConfig,
    pub chat: ChatConfig,
    pub endpoints: Endpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_dir: std::env::temp_dir().join("repo-chat"),
            clone_timeout: Duration::from_secs(600),
            request_timeout: Duration::from_secs(120),
            top_k: 4,
            chunk_size: 2000,
            chunk_overlap: 200,
            embedding: EmbeddingConfig {
                provider: Provider::Ollama,
                model: Provider::Ollama.default_embedding_model().to_string(),
                batch_size: 32,
                concurrency: 4,
            },
            chat: ChatConfig {
                provider: Provider::Ollama,
                model: Provider::Ollama.default_chat_model().to_string(),
                temperature: 0.2,
            },
            endpoints: Endpoints {
                ollama_host: "http://127.0.0.1:11434".to_string(),
                openai_base_url: "https://api.openai.com".to_string(),
                openai_api_key: None,
                gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
                gemini_api_key: None,
            },
        }
    }
}

impl Config {
    /// Build the configuration from environment variables.
    pub fn from_env() -> RagResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Unset keys keep
    /// their defaults; malformed values are rejected.
    pub fn from_lookup<F>(lookup: F) -> RagResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("REPO_CHAT_WORKSPACE_DIR") {
            config.workspace_dir = PathBuf::from(dir);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "REPO_CHAT_CLONE_TIMEOUT_SECS")? {
            config.clone_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(k) = parse_var(&lookup, "REPO_CHAT_TOP_K")? {
            config.top_k = k;
        }
        if let Some(size) = parse_var(&lookup, "REPO_CHAT_CHUNK_SIZE")? {
            config.chunk_size = size;
        }
        if let Some(overlap) = parse_var(&lookup, "REPO_CHAT_CHUNK_OVERLAP")? {
            config.chunk_overlap = overlap;
        }

        if let Some(provider) = lookup("EMBEDDING_PROVIDER") {
            let provider: Provider = provider.parse()?;
            config.embedding.provider = provider;
            config.embedding.model = provider.default_embedding_model().to_string();
        }
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Some(size) = parse_var(&lookup, "EMBEDDING_BATCH_SIZE")? {
            config.embedding.batch_size = size;
        }
        if let Some(n) = parse_var(&lookup, "EMBEDDING_CONCURRENCY")? {
            config.embedding.concurrency = n;
        }

        if let Some(provider) = lookup("CHAT_PROVIDER") {
            let provider: Provider = provider.parse()?;
            config.chat.provider = provider;
            config.chat.model = provider.default_chat_model().to_string();
        }
        if let Some(model) = lookup("CHAT_MODEL") {
            config.chat.model = model;
        }
        if let Some(temperature) = parse_var(&lookup, "CHAT_TEMPERATURE")? {
            config.chat.temperature = temperature;
        }

        if let Some(host) = lookup("OLLAMA_HOST") {
            config.endpoints.ollama_host = host;
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            config.endpoints.openai_base_url = url;
        }
        config.endpoints.openai_api_key = lookup("OPENAI_API_KEY");
        if let Some(url) = lookup("GEMINI_BASE_URL") {
            config.endpoints.gemini_base_url = url;
        }
        config.endpoints.gemini_api_key =
            lookup("GOOGLE_API_KEY").or_else(|| lookup("GEMINI_API_KEY"));

        config.validate()?;
        Ok(config)
    }

    /// HTTP client shared by the embedding and chat providers. Every
    /// request is bounded by `request_timeout`.
    pub fn http_client(&self) -> anyhow::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))
    }

    pub fn validate(&self) -> RagResult<()> {
        if self.top_k == 0 {
            return Err(RagError::Config("REPO_CHAT_TOP_K must be at least 1".into()));
        }
        if self.chunk_size == 0 {
            return Err(RagError::Config("REPO_CHAT_CHUNK_SIZE must be at least 1".into()));
        }
        if self.chunk_overlap > self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk overlap ({}) is larger than chunk size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.embedding.batch_size == 0 || self.embedding.concurrency == 0 {
            return Err(RagError::Config(
                "EMBEDDING_BATCH_SIZE and EMBEDDING_CONCURRENCY must be at least 1".into(),
            ));
        }

        for provider in [self.embedding.provider, self.chat.provider] {
            let missing = match provider {
                Provider::Ollama => None,
                Provider::OpenAI if self.endpoints.openai_api_key.is_none() => Some("OPENAI_API_KEY"),
                Provider::Gemini if self.endpoints.gemini_api_key.is_none() => Some("GOOGLE_API_KEY"),
                _ => None,
            };
            if let Some(key) = missing {
                return Err(RagError::Config(format!(
                    "{} is required for the {} provider",
                    key,
                    provider.as_str()
                )));
            }
        }

        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> RagResult<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| RagError::Config(format!("{} has an invalid value: '{}'", key, raw))),
    }
}
