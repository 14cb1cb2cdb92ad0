//! Core data models used throughout the chat pipeline.
//!
//! Everything here is request-scoped: created while handling one upload or
//! chat call and dropped when it completes. Only the knowledge store's
//! chunks and embeddings outlive a request.

use serde::{Deserialize, Serialize};

/// Where a block of raw text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextSource {
    FileUpload(String),
    Url(String),
}

/// A block of extracted text, immutable once produced.
#[derive(Debug, Clone)]
pub struct RawTextBlock {
    pub source: TextSource,
    pub text: String,
}

/// Outcome of fetching a single URL.
///
/// Exactly one of content or error is present. A failed fetch is a value,
/// not an `Err`, so batches never abort on one bad URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub url: String,
    outcome: FetchOutcome,
    /// Set when the fetched text was also written to disk.
    pub saved_path: Option<std::path::PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FetchOutcome {
    Content(String),
    Error(String),
}

impl FetchResult {
    pub fn ok(url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            outcome: FetchOutcome::Content(content.into()),
            saved_path: None,
        }
    }

    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            outcome: FetchOutcome::Error(error.into()),
            saved_path: None,
        }
    }

    pub fn with_saved_path(mut self, path: std::path::PathBuf) -> Self {
        self.saved_path = Some(path);
        self
    }

    pub fn content(&self) -> Option<&str> {
        match &self.outcome {
            FetchOutcome::Content(c) => Some(c),
            FetchOutcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            FetchOutcome::Content(_) => None,
            FetchOutcome::Error(e) => Some(e),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Error(_))
    }

    /// The text that stands in for this source downstream: the content, or
    /// the error message when the fetch failed.
    pub fn into_text(self) -> String {
        match self.outcome {
            FetchOutcome::Content(c) => c,
            FetchOutcome::Error(e) => e,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    /// `ai` is what the browser frontend sends.
    #[serde(alias = "ai")]
    Assistant,
}

impl Role {
    /// Role of a client-supplied history entry. Only conversation roles are
    /// accepted; anything else (including `system`) is `None`.
    pub fn from_history(role: &str) -> Option<Role> {
        match role {
            "user" => Some(Role::User),
            "assistant" | "ai" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// How a single query will be grounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    /// The query carried URLs: answer from freshly fetched pages.
    LiveFetch {
        urls: Vec<String>,
        residual_question: String,
    },
    /// No URLs: answer from the knowledge store.
    KnowledgeBaseQuery { question: String },
}

/// A chunk of ingested text, the knowledge store's retrieval unit.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}
