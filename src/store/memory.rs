//! In-memory [`KnowledgeStore`] for tests and ephemeral runs.
//!
//! Chunks and their vectors live in a `Vec` behind `std::sync::RwLock`.
//! Query is brute-force cosine similarity over every stored vector.

use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;

use crate::chunk::chunk_text;
use crate::embedding::{self, EmbeddingProvider};

use super::{KnowledgeStore, DOCUMENT_SEPARATOR};

struct StoredChunk {
    text: String,
    vector: Vec<f32>,
}

pub struct InMemoryKnowledgeStore {
    provider: Arc<dyn EmbeddingProvider>,
    chunks: RwLock<Vec<StoredChunk>>,
    chunk_size: usize,
    chunk_overlap: usize,
    top_k: usize,
}

impl InMemoryKnowledgeStore {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            chunks: RwLock::new(Vec::new()),
            chunk_size: 1000,
            chunk_overlap: 100,
            top_k: 4,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn len(&self) -> usize {
        self.chunks.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn add_documents(&self, texts: &[String]) -> Result<usize> {
        if texts.is_empty() {
            return Ok(0);
        }
        let chunks = chunk_text(
            &texts.join(DOCUMENT_SEPARATOR),
            self.chunk_size,
            self.chunk_overlap,
        );
        if chunks.is_empty() {
            return Ok(0);
        }

        let inputs: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.provider.embed(&inputs).await?;

        let mut stored = self
            .chunks
            .write()
            .map_err(|_| anyhow::anyhow!("knowledge store lock poisoned"))?;
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            stored.push(StoredChunk {
                text: chunk.text,
                vector,
            });
        }
        Ok(inputs.len())
    }

    async fn query(&self, question: &str) -> Result<Vec<String>> {
        let query_vec = embedding::embed_query(self.provider.as_ref(), question).await?;

        let stored = self
            .chunks
            .read()
            .map_err(|_| anyhow::anyhow!("knowledge store lock poisoned"))?;
        let mut scored: Vec<(f32, &str)> = stored
            .iter()
            .map(|sc| {
                (
                    embedding::cosine_similarity(&query_vec, &sc.vector),
                    sc.text.as_str(),
                )
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(self.top_k)
            .map(|(_, text)| text.to_string())
            .collect())
    }

    async fn is_initialized(&self) -> Result<bool> {
        Ok(!self.is_empty())
    }
}
