//! Query routing and prompt assembly.
//!
//! A query containing at least one URL is answered from those pages,
//! fetched live ([`RoutingDecision::LiveFetch`]); anything else is answered
//! from the knowledge store ([`RoutingDecision::KnowledgeBaseQuery`]).
//!
//! The prompt sent to the model is always, in order: the system
//! instruction, the most recent [`HISTORY_LIMIT`] history messages, and the
//! grounded user prompt built here.

use futures::future::join_all;
use std::sync::Arc;
use tracing::info;

use crate::error::ChatError;
use crate::fetcher::ContentFetcher;
use crate::models::{ChatMessage, FetchResult, Role, RoutingDecision};
use crate::store::KnowledgeStore;
use crate::urls;

/// Prior messages forwarded to the model (three exchanges).
pub const HISTORY_LIMIT: usize = 6;

/// Used when a live-fetch query is nothing but URLs.
pub const DEFAULT_LIVE_QUESTION: &str = "Summarize the content of the provided web page(s).";

/// Context used when retrieval returns no chunks.
pub const NO_RELEVANT_INFORMATION: &str = "No relevant information found in the documents.";

/// What the model is told to say when the context lacks the answer.
pub const NOT_FOUND_APOLOGY: &str = "I'm sorry, I couldn't find an answer in the provided documents.";

/// Decide how `query` will be grounded.
pub fn route(query: &str) -> RoutingDecision {
    let found = urls::dedup_urls(urls::find_and_clean_urls(query));
    if found.is_empty() {
        return RoutingDecision::KnowledgeBaseQuery {
            question: query.to_string(),
        };
    }

    let residual = urls::strip_urls(query);
    RoutingDecision::LiveFetch {
        urls: found,
        residual_question: if residual.is_empty() {
            DEFAULT_LIVE_QUESTION.to_string()
        } else {
            residual
        },
    }
}

/// The most recent [`HISTORY_LIMIT`] messages, oldest first.
///
/// System messages supplied by a client are dropped after truncation; the
/// only system instruction is the configured one.
pub fn truncate_history(history: &[ChatMessage]) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(HISTORY_LIMIT);
    history[start..]
        .iter()
        .filter(|m| m.role != Role::System)
        .cloned()
        .collect()
}

pub fn live_fetch_prompt(context: &str, question: &str) -> String {
    format!(
        "Answer the following question based only on the provided web page content.\n\n\
         Web Page Content:\n{}\n\n\
         Question:\n{}",
        context, question
    )
}

pub fn knowledge_base_prompt(context: &str, question: &str) -> String {
    format!(
        "Answer the following question based only on the provided context.\n\
         If the context does not contain the answer, say \"{}\"\n\n\
         Context:\n{}\n\n\
         Question:\n{}",
        NOT_FOUND_APOLOGY, context, question
    )
}

pub struct QueryRouter {
    fetcher: Arc<ContentFetcher>,
    store: Arc<dyn KnowledgeStore>,
    system_prompt: String,
}

impl QueryRouter {
    pub fn new(
        fetcher: Arc<ContentFetcher>,
        store: Arc<dyn KnowledgeStore>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            store,
            system_prompt: system_prompt.into(),
        }
    }

    /// Ground `decision` and assemble the full message list for the model.
    ///
    /// # Errors
    ///
    /// [`ChatError::KnowledgeBaseUninitialized`] for a knowledge-base query
    /// before anything was ingested; [`ChatError::Internal`] when the store
    /// itself fails.
    pub async fn build_prompt(
        &self,
        decision: &RoutingDecision,
        history: &[ChatMessage],
    ) -> Result<Vec<ChatMessage>, ChatError> {
        let user_prompt = match decision {
            RoutingDecision::LiveFetch {
                urls,
                residual_question,
            } => {
                info!("Query contains {} URL(s); fetching live content", urls.len());
                let context = self.fetch_context(urls).await;
                live_fetch_prompt(&context, residual_question)
            }
            RoutingDecision::KnowledgeBaseQuery { question } => {
                if !self.store.is_initialized().await? {
                    return Err(ChatError::KnowledgeBaseUninitialized);
                }
                let chunks = self.store.query(question).await?;
                info!("Retrieved {} chunk(s) from the knowledge base", chunks.len());
                let context = if chunks.is_empty() {
                    NO_RELEVANT_INFORMATION.to_string()
                } else {
                    chunks.join("\n\n")
                };
                knowledge_base_prompt(&context, question)
            }
        };

        let mut messages = Vec::with_capacity(HISTORY_LIMIT + 2);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(truncate_history(history));
        messages.push(ChatMessage::user(user_prompt));
        Ok(messages)
    }

    /// Fetch every URL of the query, joined with blank lines in query order.
    async fn fetch_context(&self, urls: &[String]) -> String {
        join_all(urls.iter().map(|url| self.fetcher.fetch(url)))
            .await
            .into_iter()
            .map(FetchResult::into_text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
