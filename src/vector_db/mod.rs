pub mod memory;

use anyhow::Result;

/// Vector database trait
#[async_trait::async_trait]
pub trait VectorDatabase: Send + Sync {
    async fn insert(&self, vectors: &[Vec<f32>], metadata: &[serde_json::Value]) -> Result<()>;
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchResult>>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Search result from vector database
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub score: f32,
    pub metadata: serde_json::Value,
}
