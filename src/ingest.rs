//! Upload ingestion.
//!
//! Turns uploaded files and an optional document link into raw text blocks
//! for the knowledge store:
//!
//! 1. Validate the input (non-empty, at most `uploads.max_files` files).
//! 2. Persist each file under the uploads directory.
//! 3. Extract its text via [`TextExtractable`].
//! 4. Find URLs in that text, fetch them through the coordinator and append
//!    their contents as one secondary block, separated by
//!    [`SCRAPED_CONTENT_SEPARATOR`].
//! 5. Fetch the document link, if any, saving the export next to the uploads.
//!    A failed fetch contributes its error text as the link's block.
//!
//! An upload that produces no text at all fails with
//! [`ChatError::NoContentExtracted`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::coordinator;
use crate::error::ChatError;
use crate::extract::{ExtractError, TextExtractable, UNSUPPORTED_MARKER};
use crate::fetcher::ContentFetcher;
use crate::models::{RawTextBlock, TextSource};
use crate::urls;

/// Placed between the contents of URLs scraped from one document.
pub const SCRAPED_CONTENT_SEPARATOR: &str = "\n\n--- End of Scraped Content ---\n\n";

/// A file received from the client, held in memory until persisted.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

pub struct DocumentIngestor {
    fetcher: Arc<ContentFetcher>,
    upload_dir: PathBuf,
    max_files: usize,
    max_workers: usize,
}

impl DocumentIngestor {
    pub fn new(config: &Config, fetcher: Arc<ContentFetcher>) -> Self {
        Self {
            fetcher,
            upload_dir: config.uploads.dir.clone(),
            max_files: config.uploads.max_files,
            max_workers: config.fetch.max_workers,
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub async fn ingest(
        &self,
        files: Vec<UploadedFile>,
        doc_link: Option<&str>,
    ) -> Result<Vec<RawTextBlock>, ChatError> {
        let doc_link = doc_link.map(str::trim).filter(|l| !l.is_empty());

        if files.is_empty() && doc_link.is_none() {
            return Err(ChatError::invalid("No files or document link provided"));
        }
        if files.len() > self.max_files {
            return Err(ChatError::invalid(format!(
                "You can upload a maximum of {} documents.",
                self.max_files
            )));
        }

        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(anyhow::Error::from)?;

        let mut blocks = Vec::new();

        for file in files {
            let Some(file_name) = sanitize_file_name(&file.file_name) else {
                warn!("Skipping upload with unusable file name {:?}", file.file_name);
                continue;
            };
            blocks.extend(self.ingest_file(&file_name, &file.bytes).await?);
        }

        if let Some(link) = doc_link {
            let result = self.fetcher.fetch_to(link, Some(&self.upload_dir)).await;
            if let Some(error) = result.error() {
                warn!("Document link {} could not be fetched: {}", link, error);
            }
            push_block(&mut blocks, TextSource::Url(link.to_string()), result.into_text());
        }

        if blocks.is_empty() {
            return Err(ChatError::NoContentExtracted);
        }

        info!("Ingest produced {} text block(s)", blocks.len());
        Ok(blocks)
    }

    async fn ingest_file(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Vec<RawTextBlock>, ChatError> {
        let path = self.upload_dir.join(file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| anyhow::anyhow!("failed to save {}: {}", path.display(), e))?;

        let source = TextSource::FileUpload(file_name.to_string());
        let mut blocks = Vec::new();

        let text = match TextExtractable::for_file_name(file_name).extract_text(bytes) {
            Ok(text) => text,
            Err(ExtractError::Unsupported(_)) => {
                push_block(&mut blocks, source, UNSUPPORTED_MARKER.to_string());
                return Ok(blocks);
            }
            Err(e) => {
                warn!("Skipping {}: {}", file_name, e);
                return Ok(blocks);
            }
        };

        let found = urls::dedup_urls(urls::find_and_clean_urls(&text));
        push_block(&mut blocks, source, text);

        if !found.is_empty() {
            info!("Found {} URL(s) in {}. Fetching them now.", found.len(), file_name);
            let scraped = coordinator::fetch_all(&self.fetcher, &found, self.max_workers).await;
            push_block(
                &mut blocks,
                TextSource::Url(found.join(" ")),
                scraped.join(SCRAPED_CONTENT_SEPARATOR),
            );
        }

        Ok(blocks)
    }
}

fn push_block(blocks: &mut Vec<RawTextBlock>, source: TextSource, text: String) {
    if !text.trim().is_empty() {
        blocks.push(RawTextBlock { source, text });
    }
}

/// Reduce a client-supplied name to a bare file name inside the uploads dir.
fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "." || base == ".." {
        None
    } else {
        Some(base.to_string())
    }
}
