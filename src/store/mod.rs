//! Knowledge store abstraction.
//!
//! The [`KnowledgeStore`] trait is the only way the router and ingestor
//! touch persisted knowledge. A single store handle is created at process
//! start and shared (behind an `Arc`) by every request; implementations must
//! therefore be `Send + Sync` and tolerate concurrent appends.
//!
//! Writes are append-only: [`add_documents`](KnowledgeStore::add_documents)
//! inserts new chunks and never modifies what is already indexed.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

pub use memory::InMemoryKnowledgeStore;
pub use sqlite::SqliteKnowledgeStore;

/// Separator placed between documents before they are chunked together.
pub const DOCUMENT_SEPARATOR: &str = "\n\n---\n\n";

/// Persistent retrieval index over chunked document text.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add_documents`](KnowledgeStore::add_documents) | Chunk, embed and append texts |
/// | [`query`](KnowledgeStore::query) | Top-k relevant chunk texts for a question |
/// | [`is_initialized`](KnowledgeStore::is_initialized) | Whether anything was ever indexed |
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Chunk and index `texts`. Returns the number of chunks written.
    async fn add_documents(&self, texts: &[String]) -> Result<usize>;

    /// Return the most relevant chunk texts for `question`, best first.
    async fn query(&self, question: &str) -> Result<Vec<String>>;

    /// True once at least one chunk has been indexed.
    async fn is_initialized(&self) -> Result<bool>;
}
