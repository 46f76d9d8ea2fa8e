//! TOML configuration.
//!
//! Every section has defaults, so an empty file (or [`Config::minimal`]) is
//! a working local setup against Ollama on `localhost:11434`. Two
//! environment variables override the file: `LLM_API_URL` for
//! `provider.url` and `LLM_MODEL` for `provider.llm_model`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::generation::GenerationOptions;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationOptions,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    /// Timeout for model listing and embedding requests.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Timeout for a model download, which can take many minutes.
    #[serde(default = "default_pull_timeout_secs")]
    pub pull_timeout_secs: u64,
    #[serde(default = "default_generate_timeout_secs")]
    pub generate_timeout_secs: u64,
    /// Longest text sent for embedding, in characters.
    #[serde(default = "default_max_embed_chars")]
    pub max_embed_chars: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            embed_model: default_embed_model(),
            llm_model: default_llm_model(),
            request_timeout_secs: default_request_timeout_secs(),
            pull_timeout_secs: default_pull_timeout_secs(),
            generate_timeout_secs: default_generate_timeout_secs(),
            max_embed_chars: default_max_embed_chars(),
        }
    }
}

fn default_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embed_model() -> String {
    "mxbai-embed-large".to_string()
}
fn default_llm_model() -> String {
    "smollm2:135m".to_string()
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_pull_timeout_secs() -> u64 {
    1800
}
fn default_generate_timeout_secs() -> u64 {
    600
}
fn default_max_embed_chars() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("./data/embeddings_cache.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_documents_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            root: default_documents_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_documents_root() -> PathBuf {
    PathBuf::from("./data")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: i64,
    /// Fall back to keyword search when the vector index has nothing usable.
    #[serde(default)]
    pub keyword_fallback: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            keyword_fallback: false,
        }
    }
}

fn default_top_k() -> i64 {
    5
}

impl Config {
    /// All defaults, with environment overrides applied.
    pub fn minimal() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("LLM_API_URL") {
            if !url.trim().is_empty() {
                self.provider.url = url.trim().trim_end_matches('/').to_string();
            }
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            if !model.trim().is_empty() {
                self.provider.llm_model = model.trim().to_string();
            }
        }
    }
}

/// Read, parse, apply environment overrides, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;
    config.apply_env_overrides();
    validate(&config)?;
    Ok(config)
}

/// Parse config text without environment overrides or validation.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

pub fn validate(config: &Config) -> Result<()> {
    if config.provider.url.trim().is_empty() {
        bail!("provider.url must not be empty");
    }
    if config.provider.embed_model.trim().is_empty() {
        bail!("provider.embed_model must not be empty");
    }
    if config.provider.llm_model.trim().is_empty() {
        bail!("provider.llm_model must not be empty");
    }
    if config.provider.max_embed_chars == 0 {
        bail!("provider.max_embed_chars must be > 0");
    }

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    let generation = &config.generation;
    if !(0.0..=2.0).contains(&generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }
    if !(generation.top_p > 0.0 && generation.top_p <= 1.0) {
        bail!("generation.top_p must be in (0.0, 1.0]");
    }
    if generation.max_tokens == 0 {
        bail!("generation.max_tokens must be > 0");
    }

    Ok(())
}
