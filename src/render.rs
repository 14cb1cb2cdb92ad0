//! Headless page rendering and HTML-to-text conversion.
//!
//! Dynamic pages only show their content after client-side scripts run, so
//! the generic fetch path renders them in a headless Chromium-family browser
//! and converts the resulting DOM to text.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Node};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::config::FetchConfig;

/// Renders a URL and returns the resulting HTML source.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String>;
}

/// Renders pages by running the browser binary with `--headless --dump-dom`.
///
/// Each render is its own browser process. The child is spawned with
/// `kill_on_drop`, so it is torn down on success, on error and when the
/// awaiting future is dropped.
pub struct ChromeRenderer {
    browser: PathBuf,
    window_size: String,
    settle_delay: Duration,
}

impl ChromeRenderer {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            browser: config.browser.clone(),
            window_size: config.window_size.clone(),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
        }
    }

    fn command(&self, url: &str) -> Command {
        let mut command = Command::new(&self.browser);
        command
            .arg("--headless")
            .arg("--disable-gpu")
            .arg(format!("--window-size={}", self.window_size))
            // Lets page timers run for the settle delay before the DOM is dumped.
            .arg(format!(
                "--virtual-time-budget={}",
                self.settle_delay.as_millis()
            ))
            .arg("--dump-dom")
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl PageRenderer for ChromeRenderer {
    async fn render(&self, url: &str) -> Result<String> {
        debug!("Rendering {} with {}", url, self.browser.display());

        let child = self
            .command(url)
            .spawn()
            .with_context(|| format!("failed to launch browser {}", self.browser.display()))?;

        let output = child
            .wait_with_output()
            .await
            .context("browser process failed")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "browser exited with {}: {}",
                output.status,
                stderr.lines().last().unwrap_or_default()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Convert rendered HTML into cleaned text lines.
///
/// `script` and `style` subtrees are dropped. The remaining text is split
/// into lines, each line is further split on double-space runs, every piece
/// is trimmed, empty pieces are discarded, and the rest are joined with `\n`.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();
    collect_text(document.root_element(), &mut raw);
    clean_lines(&raw)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                if matches!(el.name(), "script" | "style") {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
            }
            _ => {}
        }
    }
}

fn clean_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .flat_map(|line| line.split("  "))
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
