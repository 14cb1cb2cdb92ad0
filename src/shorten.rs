//! URL shortening of generated answers.
//!
//! [`AnswerRewriter::rewrite`] walks the distinct URLs of an answer in
//! extraction order and swaps each for its short form. For every URL exactly
//! one occurrence is replaced: the first one, together with any
//! trailing punctuation that extraction stripped. URLs already on the
//! shortener's own domain are skipped, and a failed shortening call leaves
//! the URL as it was. Rewriting itself never fails.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use regex::{NoExpand, Regex};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ShortenerConfig;
use crate::urls;

#[async_trait]
pub trait UrlShortener: Send + Sync {
    async fn shorten(&self, url: &str) -> Result<String>;
}

/// Client for is.gd-style `create.php?format=simple&url=...` endpoints.
pub struct IsGdShortener {
    endpoint: String,
    client: reqwest::Client,
}

impl IsGdShortener {
    pub fn new(config: &ShortenerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            client,
        })
    }
}

#[async_trait]
impl UrlShortener for IsGdShortener {
    async fn shorten(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("format", "simple"), ("url", url)])
            .send()
            .await
            .context("shortening request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("shortener returned {}", status);
        }

        let short = response.text().await?.trim().to_string();
        if short.is_empty() {
            bail!("shortener returned an empty body");
        }
        Ok(short)
    }
}

pub struct AnswerRewriter {
    shortener: Arc<dyn UrlShortener>,
    own_domain: String,
}

impl AnswerRewriter {
    pub fn new(shortener: Arc<dyn UrlShortener>, own_domain: impl Into<String>) -> Self {
        Self {
            shortener,
            own_domain: own_domain.into(),
        }
    }

    pub async fn rewrite(&self, answer: &str) -> String {
        let mut text = answer.to_string();

        for long_url in urls::dedup_urls(urls::find_and_clean_urls(answer)) {
            if urls::is_on_domain(&long_url, &self.own_domain) {
                continue;
            }

            let short_url = match self.shortener.shorten(&long_url).await {
                Ok(short) => short,
                Err(e) => {
                    warn!("Could not shorten {}: {:#}", long_url, e);
                    continue;
                }
            };

            text = replace_first(&text, &long_url, &short_url);
            debug!("Shortened {} to {}", long_url, short_url);
        }

        text
    }
}

/// Replace the first occurrence of `url` plus trailing punctuation.
fn replace_first(text: &str, url: &str, replacement: &str) -> String {
    let pattern = format!(r"{}[.,;:)!?]*", regex::escape(url));
    match Regex::new(&pattern) {
        Ok(re) => re.replacen(text, 1, NoExpand(replacement)).into_owned(),
        Err(_) => text.to_string(),
    }
}
