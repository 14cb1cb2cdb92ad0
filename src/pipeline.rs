//! The upload and chat flows, wired together.
//!
//! [`ChatService`] owns one handle to each collaborator, created once at
//! process start and shared by every request:
//!
//! ```text
//! upload: files/link ─▶ DocumentIngestor ─▶ KnowledgeStore::add_documents
//! chat:   query ─▶ route ─▶ QueryRouter::build_prompt ─▶ ChatModel ─▶ AnswerRewriter
//! ```

use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::embedding;
use crate::error::ChatError;
use crate::fetcher::ContentFetcher;
use crate::ingest::{DocumentIngestor, UploadedFile};
use crate::llm::{ChatModel, OpenAiChatModel};
use crate::models::ChatMessage;
use crate::render::{ChromeRenderer, PageRenderer};
use crate::router::{self, QueryRouter};
use crate::shorten::{AnswerRewriter, IsGdShortener, UrlShortener};
use crate::store::{KnowledgeStore, SqliteKnowledgeStore};

/// Message returned to the client after a successful upload.
pub const UPLOAD_SUCCESS_MESSAGE: &str = "Successfully added documents to the knowledge base.";

/// Outcome of one upload call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSummary {
    pub blocks: usize,
    pub chunks: usize,
}

pub struct ChatService {
    ingestor: DocumentIngestor,
    router: QueryRouter,
    store: Arc<dyn KnowledgeStore>,
    model: Arc<dyn ChatModel>,
    rewriter: AnswerRewriter,
}

impl ChatService {
    /// Assemble the service from explicit collaborators.
    pub fn new(
        config: &Config,
        store: Arc<dyn KnowledgeStore>,
        model: Arc<dyn ChatModel>,
        renderer: Arc<dyn PageRenderer>,
        shortener: Arc<dyn UrlShortener>,
    ) -> anyhow::Result<Self> {
        let fetcher = Arc::new(ContentFetcher::new(&config.fetch, renderer)?);

        Ok(Self {
            ingestor: DocumentIngestor::new(config, fetcher.clone()),
            router: QueryRouter::new(fetcher, store.clone(), config.llm.system_prompt.clone()),
            store,
            model,
            rewriter: AnswerRewriter::new(shortener, config.shortener.domain.clone()),
        })
    }

    /// Build the production service: SQLite store, OpenAI-compatible model,
    /// headless browser renderer and is.gd shortener.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let provider = embedding::create_provider(&config.embedding)?;
        let store = Arc::new(SqliteKnowledgeStore::open(config, provider).await?);
        let model = Arc::new(OpenAiChatModel::new(&config.llm)?);
        let renderer = Arc::new(ChromeRenderer::new(&config.fetch));
        let shortener = Arc::new(IsGdShortener::new(&config.shortener)?);

        Self::new(config, store, model, renderer, shortener)
    }

    pub fn store(&self) -> &Arc<dyn KnowledgeStore> {
        &self.store
    }

    /// Ingest files and an optional document link into the knowledge store.
    pub async fn upload(
        &self,
        files: Vec<UploadedFile>,
        doc_link: Option<&str>,
    ) -> Result<UploadSummary, ChatError> {
        let blocks = self.ingestor.ingest(files, doc_link).await?;
        let texts: Vec<String> = blocks.into_iter().map(|b| b.text).collect();
        let chunks = self.store.add_documents(&texts).await?;

        info!(
            "Upload added {} chunk(s) from {} text block(s)",
            chunks,
            texts.len()
        );
        Ok(UploadSummary {
            blocks: texts.len(),
            chunks,
        })
    }

    /// Answer `query`, grounded per its routing decision, with URLs in the
    /// answer shortened.
    pub async fn chat(&self, query: &str, history: &[ChatMessage]) -> Result<String, ChatError> {
        if query.trim().is_empty() {
            return Err(ChatError::invalid(
                "Invalid request: 'query' field is required.",
            ));
        }

        let decision = router::route(query);
        let messages = self.router.build_prompt(&decision, history).await?;

        info!("Generating answer with conversation history...");
        let answer = self.model.invoke(&messages).await?;

        Ok(self.rewriter.rewrite(&answer).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::tests::StaticRenderer;
    use crate::models::Role;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Echoes the last user prompt back with a fixed link appended.
    struct EchoModel {
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl ChatModel for EchoModel {
        async fn invoke(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
            self.seen.lock().unwrap().push(messages.to_vec());
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(format!("{} See https://example.com/source.", last))
        }
    }

    struct FixedShortener;

    #[async_trait]
    impl UrlShortener for FixedShortener {
        async fn shorten(&self, _url: &str) -> anyhow::Result<String> {
            Ok("https://is.gd/short".to_string())
        }
    }

    fn config(tmp: &TempDir) -> Config {
        let toml_str = format!(
            "[db]\npath = \"{0}/kb.sqlite\"\n\n[uploads]\ndir = \"{0}/uploads\"\n\n[server]\nbind = \"127.0.0.1:0\"\n",
            tmp.path().display()
        );
        toml::from_str(&toml_str).unwrap()
    }

    async fn service(tmp: &TempDir) -> (ChatService, Arc<EchoModel>) {
        let config = config(tmp);
        let store = Arc::new(SqliteKnowledgeStore::open(&config, None).await.unwrap());
        let model = Arc::new(EchoModel {
            seen: Mutex::new(Vec::new()),
        });
        let service = ChatService::new(
            &config,
            store,
            model.clone(),
            Arc::new(StaticRenderer),
            Arc::new(FixedShortener),
        )
        .unwrap();
        (service, model)
    }

    #[tokio::test]
    async fn upload_then_chat_answers_from_documents() {
        let tmp = TempDir::new().unwrap();
        let (service, model) = service(&tmp).await;

        let summary = service
            .upload(
                vec![UploadedFile::new(
                    "notes.txt",
                    "The document says that llamas hum.",
                )],
                None,
            )
            .await
            .unwrap();
        assert_eq!(summary, UploadSummary { blocks: 1, chunks: 1 });

        let answer = service
            .chat("what does the document say?", &[])
            .await
            .unwrap();

        assert!(answer.contains("llamas hum"));
        assert!(answer.ends_with("See https://is.gd/short"));

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0][0].role, Role::System);
    }

    #[tokio::test]
    async fn unrelated_question_is_answered_from_stored_chunks() {
        let tmp = TempDir::new().unwrap();
        let (service, _) = service(&tmp).await;

        let summary = service
            .upload(vec![UploadedFile::new("notes.txt", "no links here")], None)
            .await
            .unwrap();
        assert_eq!(summary.blocks, 1);

        let answer = service
            .chat("what does the document say?", &[])
            .await
            .unwrap();
        assert!(answer.contains("Context:\nno links here"), "{}", answer);
        assert!(!answer.contains(router::NO_RELEVANT_INFORMATION));
    }

    #[tokio::test]
    async fn chat_before_upload_fails() {
        let tmp = TempDir::new().unwrap();
        let (service, _) = service(&tmp).await;

        let err = service.chat("anything?", &[]).await.unwrap_err();
        assert!(matches!(err, ChatError::KnowledgeBaseUninitialized));
    }

    #[tokio::test]
    async fn url_query_works_without_knowledge_base() {
        let tmp = TempDir::new().unwrap();
        let (service, _) = service(&tmp).await;

        let answer = service.chat("https://news.example/today", &[]).await.unwrap();
        // The fetched page echoes its own URL, which the rewriter shortens.
        assert!(answer.contains("Web Page Content:\nPage\nhttps://is.gd/short"));
        assert!(answer.contains(router::DEFAULT_LIVE_QUESTION));
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let (service, _) = service(&tmp).await;

        let err = service.chat("   ", &[]).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));
    }
}
