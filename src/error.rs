use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the analyze/ask pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// Bad URL, network failure, or an inaccessible repository.
    #[error("Failed to fetch repository '{url}': {source:#}")]
    RepositoryFetch {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    /// A single file could not be read. Never fatal to a load.
    #[error("Failed to load {}: {source}", .path.display())]
    DocumentLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Embedding service error: {0:#}")]
    EmbeddingService(#[source] anyhow::Error),

    #[error("Failed to generate answer: {0:#}")]
    AnswerGeneration(#[source] anyhow::Error),

    #[error("No repository is ready for questions (session is {state})")]
    SessionNotReady { state: &'static str },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type RagResult<T> = std::result::Result<T, RagError>;
