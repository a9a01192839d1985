//! In-process vector store.
//!
//! Brute-force cosine similarity over every stored vector. Lives only as
//! long as the session that built it.

use super::{SearchResult, VectorDatabase};
use anyhow::Result;
use std::sync::{PoisonError, RwLock};

struct StoredVector {
    vector: Vec<f32>,
    metadata: serde_json::Value,
}

#[derive(Default)]
pub struct InMemoryVectorDatabase {
    entries: RwLock<Vec<StoredVector>>,
}

impl InMemoryVectorDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[async_trait::async_trait]
impl VectorDatabase for InMemoryVectorDatabase {
    async fn insert(&self, vectors: &[Vec<f32>], metadata: &[serde_json::Value]) -> Result<()> {
        if vectors.len() != metadata.len() {
            anyhow::bail!("Vectors and metadata length mismatch");
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.extend(
            vectors
                .iter()
                .zip(metadata.iter())
                .map(|(vector, meta)| StoredVector {
                    vector: vector.clone(),
                    metadata: meta.clone(),
                }),
        );
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);

        let mut scored: Vec<(f32, &StoredVector)> = entries
            .iter()
            .map(|entry| (cosine_similarity(vector, &entry.vector), entry))
            .collect();
        // Stable sort: equal scores keep insertion order
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, entry)| SearchResult {
                score,
                metadata: entry.metadata.clone(),
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
