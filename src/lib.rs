//! # Grounded Chat
//!
//! A retrieval-augmented chat backend. Uploaded documents (and the pages
//! they link to) are chunked into a persistent knowledge store; each chat
//! query is answered either from freshly fetched pages, when the query
//! itself contains URLs, or from the knowledge store. URLs in generated
//! answers are shortened before they are returned.
//!
//! ## Architecture
//!
//! ```text
//!  upload ──▶ ┌──────────┐   ┌─────────────┐   ┌───────────────┐
//!             │ Ingestor │──▶│ Coordinator │──▶│ ContentFetcher │
//!             └────┬─────┘   └─────────────┘   └───────────────┘
//!                  ▼                                  ▲
//!           ┌────────────────┐                        │ LiveFetch
//!           │ KnowledgeStore │◀── KnowledgeBaseQuery ─┤
//!           └────────────────┘                        │
//!  chat ────────────────────────────────▶ ┌──────────────┐   ┌───────────┐   ┌──────────┐
//!                                         │ QueryRouter  │──▶│ ChatModel │──▶│ Rewriter │
//!                                         └──────────────┘   └───────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! gchat init
//! gchat ingest ./notes.txt
//! gchat ask "what do my notes say about deployment?"
//! gchat serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Request-scoped data types |
//! | [`error`] | Caller-visible pipeline errors |
//! | [`urls`] | URL extraction and cleanup |
//! | [`render`] | Headless page rendering and HTML-to-text |
//! | [`fetcher`] | Single-URL content fetching |
//! | [`coordinator`] | Bounded parallel fetching |
//! | [`extract`] | Text extraction from uploaded files |
//! | [`ingest`] | Upload ingestion |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Knowledge store trait and implementations |
//! | [`llm`] | Language model client |
//! | [`router`] | Query routing and prompt assembly |
//! | [`shorten`] | URL shortening of answers |
//! | [`pipeline`] | Upload and chat flows |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`logging`] | Tracing subscriber setup |

pub mod chunk;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod render;
pub mod router;
pub mod server;
pub mod shorten;
pub mod store;
pub mod urls;
