//! Application configuration for WikiDigest.
//!
//! User config lives at `~/.wikidigest/wikidigest.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WikiDigestError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "wikidigest.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".wikidigest";

/// Default database file name inside the config directory.
const DATABASE_FILE_NAME: &str = "wikidigest.db";

// ---------------------------------------------------------------------------
// Config structs (matching wikidigest.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Traversal limits and page-structure selectors.
    #[serde(default)]
    pub crawl: CrawlSection,

    /// Summarization API settings.
    #[serde(default)]
    pub summarizer: SummarizerConfig,

    /// HTTP API bind address.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database location.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// How long the Visited Tracker remembers claimed URLs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitedScope {
    /// One tracker per crawler instance, shared by every crawl it serves and never cleared.
    #[default]
    Instance,
    /// A fresh tracker for every root crawl.
    PerCrawl,
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSection {
    /// Depth ceiling; no document is created at or beyond this depth.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Maximum children followed per document.
    #[serde(default = "default_link_cap")]
    pub link_cap: usize,

    /// Maximum candidates the link extractor yields per page.
    #[serde(default = "default_extractor_cap")]
    pub extractor_cap: usize,

    /// Stored content is cut to this many characters.
    #[serde(default = "default_content_budget")]
    pub content_budget: usize,

    /// Path prefix an article link must start with.
    #[serde(default = "default_article_prefix")]
    pub article_prefix: String,

    /// CSS selector of the main content region.
    #[serde(default = "default_content_selector")]
    pub content_selector: String,

    /// CSS selector of the article heading.
    #[serde(default = "default_title_selector")]
    pub title_selector: String,

    /// Classes marking `div`/`table` boilerplate inside the content region.
    #[serde(default = "default_boilerplate_classes")]
    pub boilerplate_classes: Vec<String>,

    /// Lifetime of the visited set.
    #[serde(default)]
    pub visited_scope: VisitedScope,
}

impl Default for CrawlSection {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            link_cap: default_link_cap(),
            extractor_cap: default_extractor_cap(),
            content_budget: default_content_budget(),
            article_prefix: default_article_prefix(),
            content_selector: default_content_selector(),
            title_selector: default_title_selector(),
            boilerplate_classes: default_boilerplate_classes(),
            visited_scope: VisitedScope::default(),
        }
    }
}

fn default_max_depth() -> u32 {
    5
}
fn default_link_cap() -> usize {
    3
}
fn default_extractor_cap() -> usize {
    10
}
fn default_content_budget() -> usize {
    5000
}
fn default_article_prefix() -> String {
    "/wiki/".into()
}
fn default_content_selector() -> String {
    "div#mw-content-text".into()
}
fn default_title_selector() -> String {
    "h1.firstHeading".into()
}
fn default_boilerplate_classes() -> Vec<String> {
    ["navbox", "infobox", "metadata", "ambox"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// `[summarizer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// OpenAI-compatible chat completions endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model ID sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds.
    #[serde(default = "default_summary_timeout")]
    pub timeout_secs: u64,

    /// Characters of document content included in the prompt.
    #[serde(default = "default_summary_budget")]
    pub content_budget: usize,

    /// Language the abstract is written in.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_summary_timeout(),
            content_budget: default_summary_budget(),
            language: default_language(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.deepseek.com/v1/chat/completions".into()
}
fn default_model() -> String {
    "deepseek-chat".into()
}
fn default_api_key_env() -> String {
    "DEEPSEEK_API_KEY".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    300
}
fn default_summary_timeout() -> u64 {
    60
}
fn default_summary_budget() -> usize {
    3000
}
fn default_language() -> String {
    "English".into()
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8000
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file; defaults to `~/.wikidigest/wikidigest.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Crawl config (runtime, derived from the app config)
// ---------------------------------------------------------------------------

/// Runtime crawl configuration consumed by the traversal engine.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub max_depth: u32,
    pub link_cap: usize,
    pub extractor_cap: usize,
    pub content_budget: usize,
    pub article_prefix: String,
    pub content_selector: String,
    pub title_selector: String,
    pub boilerplate_classes: Vec<String>,
    pub visited_scope: VisitedScope,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        let crawl = &config.crawl;
        Self {
            max_depth: crawl.max_depth,
            link_cap: crawl.link_cap,
            extractor_cap: crawl.extractor_cap,
            content_budget: crawl.content_budget,
            article_prefix: crawl.article_prefix.clone(),
            content_selector: crawl.content_selector.clone(),
            title_selector: crawl.title_selector.clone(),
            boilerplate_classes: crawl.boilerplate_classes.clone(),
            visited_scope: crawl.visited_scope,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.wikidigest/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| WikiDigestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.wikidigest/wikidigest.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the database path: the configured one, or the default under the config dir.
pub fn database_path(config: &AppConfig) -> Result<PathBuf> {
    match &config.storage.database_path {
        Some(path) => Ok(PathBuf::from(path)),
        None => Ok(config_dir()?.join(DATABASE_FILE_NAME)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| WikiDigestError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        WikiDigestError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| WikiDigestError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| WikiDigestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| WikiDigestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the summarizer API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.summarizer.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(WikiDigestError::config(format!(
            "summarizer API key not found. Set the {var_name} environment variable."
        ))),
    }
}
