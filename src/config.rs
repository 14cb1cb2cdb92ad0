use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub shortener: ShortenerConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Character-based chunking parameters for the knowledge store.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            base_url: default_openai_base_url(),
            batch_size: 64,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            base_url: default_openai_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_llm_timeout_secs(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_system_prompt() -> String {
    "You are a helpful assistant. Answer questions based on the provided context.".to_string()
}

/// Settings for live page fetching.
#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    /// Host whose documents are fetched through the plain-text export endpoint.
    #[serde(default = "default_export_host")]
    pub export_host: String,
    #[serde(default = "default_export_base_url")]
    pub export_base_url: String,
    #[serde(default = "default_export_timeout_secs")]
    pub export_timeout_secs: u64,
    /// Fixed wait for client-side rendering before the DOM is captured.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_browser")]
    pub browser: PathBuf,
    #[serde(default = "default_window_size")]
    pub window_size: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            export_host: default_export_host(),
            export_base_url: default_export_base_url(),
            export_timeout_secs: default_export_timeout_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            max_workers: default_max_workers(),
            browser: default_browser(),
            window_size: default_window_size(),
        }
    }
}

fn default_export_host() -> String {
    "docs.google.com".to_string()
}
fn default_export_base_url() -> String {
    "https://docs.google.com".to_string()
}
fn default_export_timeout_secs() -> u64 {
    10
}
fn default_settle_delay_ms() -> u64 {
    3000
}
fn default_max_workers() -> usize {
    10
}
fn default_browser() -> PathBuf {
    PathBuf::from("chromium")
}
fn default_window_size() -> String {
    "1920,1080".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShortenerConfig {
    #[serde(default = "default_shortener_endpoint")]
    pub endpoint: String,
    /// URLs already on this domain are never re-shortened.
    #[serde(default = "default_shortener_domain")]
    pub domain: String,
    #[serde(default = "default_shortener_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ShortenerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_shortener_endpoint(),
            domain: default_shortener_domain(),
            timeout_secs: default_shortener_timeout_secs(),
        }
    }
}

fn default_shortener_endpoint() -> String {
    "https://is.gd/create.php".to_string()
}
fn default_shortener_domain() -> String {
    "is.gd".to_string()
}
fn default_shortener_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadsConfig {
    #[serde(default = "default_uploads_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: default_uploads_dir(),
            max_files: default_max_files(),
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}
fn default_max_files() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl Config {
    /// Verify that every API key the configured providers need is present.
    ///
    /// Called before serving or answering anything; a missing key aborts the
    /// process instead of failing the first request.
    pub fn require_credentials(&self) -> Result<()> {
        if std::env::var(&self.llm.api_key_env).is_err() {
            bail!(
                "{} environment variable not set (required by llm provider '{}')",
                self.llm.api_key_env,
                self.llm.provider
            );
        }
        if self.embedding.is_enabled() && std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.llm.provider != "openai" {
        bail!(
            "Unknown llm provider: '{}'. Must be openai.",
            config.llm.provider
        );
    }

    if config.fetch.max_workers == 0 {
        bail!("fetch.max_workers must be >= 1");
    }

    if config.uploads.max_files == 0 {
        bail!("uploads.max_files must be >= 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/chat.sqlite"

[server]
bind = "127.0.0.1:5000"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 100);
        assert_eq!(config.fetch.export_timeout_secs, 10);
        assert_eq!(config.fetch.settle_delay_ms, 3000);
        assert_eq!(config.fetch.max_workers, 10);
        assert_eq!(config.shortener.timeout_secs, 5);
        assert_eq!(config.shortener.domain, "is.gd");
        assert_eq!(config.uploads.max_files, 3);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let toml_str = format!("{}\n[chunking]\nchunk_size = 100\nchunk_overlap = 100\n", MINIMAL);
        let config: Config = toml::from_str(&toml_str).unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn enabled_embedding_requires_model_and_dims() {
        let toml_str = format!("{}\n[embedding]\nprovider = \"openai\"\n", MINIMAL);
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn unknown_llm_provider_rejected() {
        let toml_str = format!("{}\n[llm]\nprovider = \"carrier-pigeon\"\n", MINIMAL);
        let config: Config = toml::from_str(&toml_str).unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("carrier-pigeon"));
    }

    #[test]
    fn missing_api_key_is_reported() {
        let toml_str = format!(
            "{}\n[llm]\napi_key_env = \"GROUNDED_CHAT_TEST_KEY_THAT_IS_NEVER_SET\"\n",
            MINIMAL
        );
        let config: Config = toml::from_str(&toml_str).unwrap();
        let err = config.require_credentials().unwrap_err();
        assert!(err
            .to_string()
            .contains("GROUNDED_CHAT_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
