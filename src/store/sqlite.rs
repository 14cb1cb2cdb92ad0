//! SQLite-backed [`KnowledgeStore`].
//!
//! Chunks live in `chunks` with a parallel FTS5 index (`chunks_fts`). When an
//! embedding provider is configured, every chunk also gets a row in
//! `chunk_vectors` and queries rank by cosine similarity computed in Rust.
//! Without a provider, queries fall back to FTS5 keyword ranking, topped up
//! with the newest chunks.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::migrate;
use crate::models::Chunk;

use super::{KnowledgeStore, DOCUMENT_SEPARATOR};

pub struct SqliteKnowledgeStore {
    pool: SqlitePool,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    chunk_size: usize,
    chunk_overlap: usize,
    top_k: usize,
    batch_size: usize,
}

impl SqliteKnowledgeStore {
    /// Open (creating if needed) the store configured in `[db]`.
    pub async fn open(config: &Config, provider: Option<Arc<dyn EmbeddingProvider>>) -> Result<Self> {
        let store = Self::open_at(
            &config.db.path,
            provider,
            config.chunking.chunk_size,
            config.chunking.chunk_overlap,
            config.retrieval.top_k,
        )
        .await?;
        info!("Knowledge base opened at {}", config.db.path.display());
        Ok(Self {
            batch_size: config.embedding.batch_size.max(1),
            ..store
        })
    }

    pub async fn open_at(
        path: &Path,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        chunk_size: usize,
        chunk_overlap: usize,
        top_k: usize,
    ) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self {
            pool,
            provider,
            chunk_size,
            chunk_overlap,
            top_k,
            batch_size: 64,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn embed_chunks(
        &self,
        provider: &dyn EmbeddingProvider,
        chunks: &[Chunk],
    ) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            vectors.extend(provider.embed(&texts).await?);
        }
        Ok(vectors)
    }

    async fn vector_query(
        &self,
        provider: &dyn EmbeddingProvider,
        question: &str,
    ) -> Result<Vec<String>> {
        let query_vec = embedding::embed_query(provider, question).await?;

        let rows = sqlx::query(
            r#"
            SELECT c.text, cv.embedding
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            WHERE cv.model = ?
            "#,
        )
        .bind(provider.model_name())
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(f32, String)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = embedding::blob_to_vec(&blob);
                (
                    embedding::cosine_similarity(&query_vec, &vec),
                    row.get("text"),
                )
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.top_k);

        Ok(scored.into_iter().map(|(_, text)| text).collect())
    }

    /// FTS5 matches first, then the most recently added chunks until `top_k`
    /// texts are collected, so a question sharing no terms with the corpus
    /// still gets context.
    async fn keyword_query(&self, question: &str) -> Result<Vec<String>> {
        let limit = self.top_k as i64;
        let mut texts: Vec<String> = match fts_match_expression(question) {
            Some(match_expr) => {
                sqlx::query_scalar(
                    r#"
                    SELECT text
                    FROM chunks_fts
                    WHERE chunks_fts MATCH ?
                    ORDER BY rank
                    LIMIT ?
                    "#,
                )
                .bind(match_expr)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => Vec::new(),
        };

        if texts.len() < self.top_k {
            let recent: Vec<String> =
                sqlx::query_scalar("SELECT text FROM chunks ORDER BY rowid DESC LIMIT ?")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?;
            for text in recent {
                if texts.len() >= self.top_k {
                    break;
                }
                if !texts.contains(&text) {
                    texts.push(text);
                }
            }
        }

        Ok(texts)
    }
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    async fn add_documents(&self, texts: &[String]) -> Result<usize> {
        if texts.is_empty() {
            warn!("No documents provided to add to the knowledge base.");
            return Ok(0);
        }

        let chunks = chunk_text(
            &texts.join(DOCUMENT_SEPARATOR),
            self.chunk_size,
            self.chunk_overlap,
        );
        if chunks.is_empty() {
            warn!("No text chunks generated from the provided documents.");
            return Ok(0);
        }

        // Embed before touching the database so a failed call writes nothing.
        let vectors = match &self.provider {
            Some(provider) => Some(self.embed_chunks(provider.as_ref(), &chunks).await?),
            None => None,
        };

        let batch_id = Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO batches (id, created_at, source_count) VALUES (?, ?, ?)")
            .bind(&batch_id)
            .bind(chrono::Utc::now().timestamp())
            .bind(texts.len() as i64)
            .execute(&mut *tx)
            .await?;

        for (i, chunk) in chunks.iter().enumerate() {
            sqlx::query(
                "INSERT INTO chunks (id, batch_id, chunk_index, text, hash) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&batch_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO chunks_fts (chunk_id, text) VALUES (?, ?)")
                .bind(&chunk.id)
                .bind(&chunk.text)
                .execute(&mut *tx)
                .await?;

            if let (Some(provider), Some(vectors)) = (&self.provider, &vectors) {
                sqlx::query(
                    "INSERT INTO chunk_vectors (chunk_id, model, dims, embedding) VALUES (?, ?, ?, ?)",
                )
                .bind(&chunk.id)
                .bind(provider.model_name())
                .bind(vectors[i].len() as i64)
                .bind(embedding::vec_to_blob(&vectors[i]))
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        info!(
            "Added {} text chunks to the knowledge base (batch {})",
            chunks.len(),
            batch_id
        );
        Ok(chunks.len())
    }

    async fn query(&self, question: &str) -> Result<Vec<String>> {
        match &self.provider {
            Some(provider) => self.vector_query(provider.as_ref(), question).await,
            None => self.keyword_query(question).await,
        }
    }

    async fn is_initialized(&self) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM chunks)")
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

/// Turn free text into an FTS5 `OR` query of quoted terms.
///
/// Raw questions contain punctuation that FTS5 treats as syntax, so only
/// alphanumeric terms are kept.
fn fts_match_expression(question: &str) -> Option<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in question
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
    {
        if !terms.contains(&term) {
            terms.push(term);
        }
    }

    if terms.is_empty() {
        return None;
    }

    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}
