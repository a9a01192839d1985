//! Builds and queries the vector index of one analyzed repository.

use crate::embedding::{Embedding, EmbeddingProvider};
use crate::error::{RagError, RagResult};
use crate::splitter::Chunk;
use crate::vector_db::memory::InMemoryVectorDatabase;
use crate::vector_db::VectorDatabase;
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Throughput settings for [`VectorIndex::build`]
#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
    pub batch_size: usize,
    pub concurrency: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            concurrency: 4,
        }
    }
}

/// A chunk returned by a similarity query
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub source: PathBuf,
    pub index: usize,
    pub content: String,
    pub score: f32,
}

/// Chunk embeddings plus the provider that produced them. Queries are
/// embedded with the same provider.
pub struct VectorIndex {
    store: Arc<dyn VectorDatabase>,
    embedding: Arc<dyn EmbeddingProvider>,
}

impl VectorIndex {
    /// Embed every chunk and store it with its text and source.
    ///
    /// Chunks with identical text are embedded once. Any embedding failure
    /// aborts the build; nothing partial is returned.
    pub async fn build(
        chunks: &[Chunk],
        embedding: Arc<dyn EmbeddingProvider>,
        options: IndexOptions,
    ) -> RagResult<Self> {
        let store = Arc::new(InMemoryVectorDatabase::new());

        if !chunks.is_empty() {
            let vectors = embed_chunks(chunks, embedding.as_ref(), options)
                .await
                .map_err(RagError::EmbeddingService)?;

            let metadata: Vec<Value> = chunks
                .iter()
                .map(|c| {
                    json!({
                        "source": c.source.to_string_lossy(),
                        "chunk_index": c.index,
                        "content": c.content,
                    })
                })
                .collect();

            store
                .insert(&vectors, &metadata)
                .await
                .map_err(RagError::EmbeddingService)?;
        }

        tracing::info!(
            "Indexed {} chunks with embedding model {}",
            store.len(),
            embedding.model()
        );

        Ok(Self { store, embedding })
    }

    /// Return the `k` chunks closest to `text`, best first.
    ///
    /// An empty index answers with no results without calling the
    /// embedding service.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        if self.store.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query = self
            .embedding
            .embed(text)
            .await
            .context("Failed to embed question")?;

        let results = self.store.search(&query.values, k).await?;

        Ok(results
            .into_iter()
            .map(|r| RetrievedChunk {
                source: PathBuf::from(
                    r.metadata
                        .get("source")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown"),
                ),
                index: r
                    .metadata
                    .get("chunk_index")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as usize,
                content: r
                    .metadata
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                score: r.score,
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

async fn embed_chunks(
    chunks: &[Chunk],
    embedding: &dyn EmbeddingProvider,
    options: IndexOptions,
) -> Result<Vec<Vec<f32>>> {
    // Duplicate texts (vendored copies, license headers) share one embedding
    let mut slot_by_hash: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<&str> = Vec::new();
    let slots: Vec<usize> = chunks
        .iter()
        .map(|chunk| {
            let hash = hex::encode(Sha256::digest(chunk.content.as_bytes()));
            *slot_by_hash.entry(hash).or_insert_with(|| {
                unique.push(chunk.content.as_str());
                unique.len() - 1
            })
        })
        .collect();

    tracing::debug!(
        "Embedding {} unique texts out of {} chunks",
        unique.len(),
        chunks.len()
    );

    let batches: Vec<&[&str]> = unique.chunks(options.batch_size.max(1)).collect();
    // `buffered` keeps batch order, so results line up with `unique`
    let batched: Vec<Vec<Embedding>> = stream::iter(batches)
        .map(|batch| async move {
            let embeddings = embedding.embed_batch(batch).await?;
            if embeddings.len() != batch.len() {
                anyhow::bail!(
                    "embedding service returned {} vectors for {} texts",
                    embeddings.len(),
                    batch.len()
                );
            }
            Ok::<_, anyhow::Error>(embeddings)
        })
        .buffered(options.concurrency.max(1))
        .try_collect()
        .await?;

    let embedded: Vec<Vec<f32>> = batched.into_iter().flatten().map(|e| e.values).collect();
    Ok(slots.into_iter().map(|slot| embedded[slot].clone()).collect())
}
