//! Content fetching for a single URL.
//!
//! Two paths:
//! - **Document export**: URLs on the configured export host (shared online
//!   documents) are fetched straight from the plain-text export endpoint,
//!   with no rendering.
//! - **Rendered page**: everything else is rendered by a [`PageRenderer`]
//!   and converted to text with [`html_to_text`].
//!
//! Fetching never returns `Err`: every failure becomes a [`FetchResult`]
//! whose error text stands in for the page's content.

use regex::Regex;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::FetchConfig;
use crate::models::FetchResult;
use crate::render::{html_to_text, PageRenderer};
use crate::urls;

fn document_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"/document/d/([^/?#]+)").expect("static doc id pattern"))
}

/// Extract the document identifier from an export-host URL path.
pub fn document_id(url: &str) -> Option<&str> {
    document_id_pattern()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// File name used when an exported document is saved to disk.
pub fn export_file_name(doc_id: &str) -> String {
    let safe: String = doc_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("gdoc_{}.txt", safe)
}

pub struct ContentFetcher {
    client: Client,
    export_host: String,
    export_base_url: String,
    renderer: Arc<dyn PageRenderer>,
}

impl ContentFetcher {
    pub fn new(config: &FetchConfig, renderer: Arc<dyn PageRenderer>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.export_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            export_host: config.export_host.clone(),
            export_base_url: config.export_base_url.trim_end_matches('/').to_string(),
            renderer,
        })
    }

    /// Whether `url` takes the document-export fast path.
    pub fn is_export_url(&self, url: &str) -> bool {
        urls::is_on_domain(url, &self.export_host)
    }

    /// Fetch a single URL's text.
    pub async fn fetch(&self, url: &str) -> FetchResult {
        self.fetch_to(url, None).await
    }

    /// Fetch a URL, saving export-path results into `save_dir` when given.
    pub async fn fetch_to(&self, url: &str, save_dir: Option<&Path>) -> FetchResult {
        if self.is_export_url(url) {
            info!("Detected shared document. Using direct export for: {}", url);
            self.fetch_export(url, save_dir).await
        } else {
            info!("Rendering general URL: {}", url);
            self.fetch_rendered(url).await
        }
    }

    async fn fetch_export(&self, url: &str, save_dir: Option<&Path>) -> FetchResult {
        let Some(doc_id) = document_id(url) else {
            return FetchResult::failed(url, "Error: Could not extract document ID from URL.");
        };

        match self.export_text(doc_id, save_dir).await {
            Ok((content, saved_path)) => {
                let result = FetchResult::ok(url, content);
                match saved_path {
                    Some(path) => result.with_saved_path(path),
                    None => result,
                }
            }
            Err(e) => {
                warn!("Export failed for {}: {:#}", url, e);
                FetchResult::failed(
                    url,
                    format!("Error: Could not export document. Details: {:#}", e),
                )
            }
        }
    }

    async fn export_text(
        &self,
        doc_id: &str,
        save_dir: Option<&Path>,
    ) -> anyhow::Result<(String, Option<PathBuf>)> {
        let export_url = format!(
            "{}/document/d/{}/export?format=txt",
            self.export_base_url, doc_id
        );

        let response = self.client.get(&export_url).send().await?;
        let content = response.error_for_status()?.text().await?;

        let saved_path = match save_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                let path = dir.join(export_file_name(doc_id));
                tokio::fs::write(&path, &content).await?;
                info!("Saved exported document to: {}", path.display());
                Some(path)
            }
            None => None,
        };

        Ok((content, saved_path))
    }

    async fn fetch_rendered(&self, url: &str) -> FetchResult {
        match self.renderer.render(url).await {
            Ok(html) => FetchResult::ok(url, html_to_text(&html)),
            Err(e) => {
                warn!("Rendering failed for {}: {:#}", url, e);
                FetchResult::failed(
                    url,
                    format!(
                        "Error: Could not retrieve content using headless browser. Details: {:#}",
                        e
                    ),
                )
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::bail;
    use async_trait::async_trait;
    use axum::{extract::Path as AxumPath, http::StatusCode, routing::get, Router};
    use tempfile::TempDir;

    /// Serves fixed HTML; URLs containing "fail" error out.
    pub(crate) struct StaticRenderer;

    #[async_trait]
    impl PageRenderer for StaticRenderer {
        async fn render(&self, url: &str) -> anyhow::Result<String> {
            if url.contains("fail") {
                bail!("net::ERR_NAME_NOT_RESOLVED");
            }
            Ok(format!(
                "<html><body><script>x()</script><h1>Page</h1>\n<p>{}</p></body></html>",
                url
            ))
        }
    }

    pub(crate) async fn spawn_export_server() -> String {
        let app = Router::new().route(
            "/document/d/{id}/export",
            get(|AxumPath(id): AxumPath<String>| async move {
                if id == "missing" {
                    Err(StatusCode::NOT_FOUND)
                } else {
                    Ok(format!("exported text of {}", id))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn fetcher_with(export_base_url: &str) -> ContentFetcher {
        let config = FetchConfig {
            export_base_url: export_base_url.to_string(),
            ..FetchConfig::default()
        };
        ContentFetcher::new(&config, Arc::new(StaticRenderer)).unwrap()
    }

    #[test]
    fn extracts_document_id() {
        assert_eq!(
            document_id("https://docs.google.com/document/d/abc123/edit?usp=sharing"),
            Some("abc123")
        );
        assert_eq!(document_id("https://docs.google.com/spreadsheets/x"), None);
    }

    #[test]
    fn export_file_name_is_deterministic_and_safe() {
        assert_eq!(export_file_name("abc-123_X"), "gdoc_abc-123_X.txt");
        assert_eq!(export_file_name("../evil"), "gdoc____evil.txt");
    }

    #[tokio::test]
    async fn rendered_page_is_cleaned() {
        let fetcher = fetcher_with("http://127.0.0.1:9");
        let result = fetcher.fetch("https://example.com/page").await;
        assert_eq!(
            result.content(),
            Some("Page\nhttps://example.com/page")
        );
    }

    #[tokio::test]
    async fn render_failure_becomes_error_result() {
        let fetcher = fetcher_with("http://127.0.0.1:9");
        let result = fetcher.fetch("https://fail.example.com").await;
        assert!(result.is_error());
        let error = result.error().unwrap();
        assert!(error.starts_with("Error: Could not retrieve content"));
        assert!(error.contains("ERR_NAME_NOT_RESOLVED"));
    }

    #[tokio::test]
    async fn export_path_fetches_plain_text_and_saves() {
        let base = spawn_export_server().await;
        let fetcher = fetcher_with(&base);
        let tmp = TempDir::new().unwrap();

        let result = fetcher
            .fetch_to(
                "https://docs.google.com/document/d/doc42/edit",
                Some(tmp.path()),
            )
            .await;

        assert_eq!(result.content(), Some("exported text of doc42"));
        let saved = result.saved_path.clone().unwrap();
        assert_eq!(saved, tmp.path().join("gdoc_doc42.txt"));
        assert_eq!(
            std::fs::read_to_string(saved).unwrap(),
            "exported text of doc42"
        );
    }

    #[tokio::test]
    async fn export_http_error_is_reported() {
        let base = spawn_export_server().await;
        let fetcher = fetcher_with(&base);
        let result = fetcher
            .fetch("https://docs.google.com/document/d/missing/edit")
            .await;
        assert!(result
            .error()
            .unwrap()
            .starts_with("Error: Could not export document."));
    }

    #[tokio::test]
    async fn export_url_without_id_is_reported() {
        let fetcher = fetcher_with("http://127.0.0.1:9");
        let result = fetcher.fetch("https://docs.google.com/presentation").await;
        assert_eq!(
            result.error(),
            Some("Error: Could not extract document ID from URL.")
        );
    }
}
