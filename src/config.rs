//! Configuration loading and environment-style overrides.
//!
//! Settings come from three places, highest precedence first:
//!
//! 1. Override layers: ordered key/value maps such as per-deployment
//!    platform bindings followed by the process environment.
//! 2. The TOML file passed with `--config`.
//! 3. Built-in defaults.
//!
//! Override resolution is a pure function of its inputs
//! ([`Config::with_overrides`]) so it can be tested without touching the
//! real environment. Within a single layer the provider-agnostic key
//! (`CHAT_API_KEY`) is consulted before its legacy alias (`OPENAI_API_KEY`).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One ordered source of `KEY=value` overrides.
pub type OverrideLayer = HashMap<String, String>;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub content: ContentConfig,
    pub chunking: ChunkingConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub chat: ChatConfig,
    pub server: ServerConfig,
}

/// Where ingestion looks for source documents.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ContentConfig {
    pub root: PathBuf,
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub follow_symlinks: bool,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("content"),
            include_globs: vec![
                "**/*.md".to_string(),
                "**/*.mdx".to_string(),
                "**/*.txt".to_string(),
                "**/*.json".to_string(),
            ],
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

/// Chunk sizes are measured in characters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::chunk::DEFAULT_CHUNK_SIZE,
            overlap: crate::chunk::DEFAULT_OVERLAP,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    /// Ingestion output, and the load location when `url` is unset.
    pub path: PathBuf,
    /// Load the index over HTTP instead of from `path`.
    pub url: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("static/data/index.json"),
            url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Best score below this marks a question as out of scope.
    pub min_score: f64,
    /// Guaranteed sources, primary first.
    pub anchors: Vec<AnchorConfig>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.1,
            anchors: vec![
                AnchorConfig {
                    source: "resume.json".to_string(),
                    boost: 0.08,
                },
                AnchorConfig {
                    source: "linkedin.md".to_string(),
                    boost: 0.01,
                },
            ],
        }
    }
}

/// A source that receives a score boost and is guaranteed a result slot.
///
/// `source` is matched case-insensitively as a substring of the entry's
/// source path.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AnchorConfig {
    pub source: String,
    #[serde(default)]
    pub boost: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
    /// Local embedding service; only honoured on a loopback host.
    pub local_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: "text-embedding-3-small".to_string(),
            local_url: None,
            timeout_secs: 30,
            max_retries: 2,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub site_url: String,
    pub site_name: String,
    /// Who the assistant speaks for, used in the system prompt.
    pub persona: String,
    pub temperature: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub max_tokens: u32,
    pub max_history: usize,
    pub timeout_secs: u64,
    pub refusal: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "openrouter/auto".to_string(),
            site_url: "http://localhost:5173".to_string(),
            site_name: "Personal Website Chatbot".to_string(),
            persona: "the site owner".to_string(),
            temperature: 0.5,
            frequency_penalty: 0.2,
            presence_penalty: 0.0,
            max_tokens: 250,
            max_history: 20,
            timeout_secs: 60,
            refusal: "That's outside the scope of my background and this site's content."
                .to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
        }
    }
}

// Override keys, provider-agnostic name first.
const CHAT_API_KEY: &[&str] = &["CHAT_API_KEY", "OPENAI_API_KEY"];
const CHAT_BASE_URL: &[&str] = &["CHAT_BASE_URL", "OPENAI_BASE_URL"];
const CHAT_MODEL: &[&str] = &["CHAT_MODEL", "OPENAI_CHAT_MODEL"];
const EMBEDDING_API_KEY: &[&str] = &["EMBEDDING_API_KEY", "OPENAI_EMBED_API_KEY"];
const EMBEDDING_BASE_URL: &[&str] = &["EMBEDDING_BASE_URL", "OPENAI_EMBED_BASE_URL"];
const EMBEDDING_MODEL: &[&str] = &["EMBEDDING_MODEL", "OPENAI_EMBED_MODEL"];
const LOCAL_EMBED_URL: &[&str] = &["LOCAL_EMBED_URL", "PY_EMBED_URL"];
const SITE_URL: &[&str] = &["SITE_URL", "OPENROUTER_SITE_URL"];
const ORIGIN: &[&str] = &["ORIGIN"];
const SITE_NAME: &[&str] = &["SITE_NAME", "OPENROUTER_SITE_NAME"];

/// Every key [`Config::with_overrides`] understands.
pub const OVERRIDE_KEYS: &[&[&str]] = &[
    CHAT_API_KEY,
    CHAT_BASE_URL,
    CHAT_MODEL,
    EMBEDDING_API_KEY,
    EMBEDDING_BASE_URL,
    EMBEDDING_MODEL,
    LOCAL_EMBED_URL,
    SITE_URL,
    ORIGIN,
    SITE_NAME,
];

/// First non-empty value for `keys`, scanning layers in order.
fn pick(layers: &[&OverrideLayer], keys: &[&str]) -> Option<String> {
    layers.iter().find_map(|layer| {
        keys.iter().find_map(|key| {
            layer
                .get(*key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Merge override layers over this config.
    ///
    /// Layers are consulted in order and the first non-empty value wins;
    /// a setting no layer provides keeps its file or default value. The
    /// embedding API key falls back to the chat API key, and the site URL
    /// falls back to `ORIGIN`.
    pub fn with_overrides(mut self, layers: &[&OverrideLayer]) -> Self {
        if let Some(v) = pick(layers, CHAT_API_KEY) {
            self.chat.api_key = Some(v);
        }
        if let Some(v) = pick(layers, CHAT_BASE_URL) {
            self.chat.base_url = v;
        }
        if let Some(v) = pick(layers, CHAT_MODEL) {
            self.chat.model = v;
        }
        if let Some(v) = pick(layers, EMBEDDING_API_KEY) {
            self.embedding.api_key = Some(v);
        }
        if let Some(v) = pick(layers, EMBEDDING_BASE_URL) {
            self.embedding.base_url = Some(v);
        }
        if let Some(v) = pick(layers, EMBEDDING_MODEL) {
            self.embedding.model = v;
        }
        if let Some(v) = pick(layers, LOCAL_EMBED_URL) {
            self.embedding.local_url = Some(v);
        }
        if let Some(v) = pick(layers, SITE_URL).or_else(|| pick(layers, ORIGIN)) {
            self.chat.site_url = v;
        }
        if let Some(v) = pick(layers, SITE_NAME) {
            self.chat.site_name = v;
        }

        self.chat.api_key = non_empty(self.chat.api_key);
        self.embedding.api_key = non_empty(self.embedding.api_key).or_else(|| self.chat.api_key.clone());
        self.embedding.base_url = non_empty(self.embedding.base_url);
        self.embedding.local_url = non_empty(self.embedding.local_url);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.retrieval.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }
        if !self.retrieval.min_score.is_finite() {
            bail!("retrieval.min_score must be a finite number");
        }
        for anchor in &self.retrieval.anchors {
            if anchor.source.trim().is_empty() {
                bail!("retrieval.anchors entries need a non-empty source");
            }
            if !anchor.boost.is_finite() {
                bail!("retrieval.anchors boost for '{}' must be finite", anchor.source);
            }
        }
        if self.embedding.timeout_secs == 0 {
            bail!("embedding.timeout_secs must be > 0");
        }
        if self.chat.timeout_secs == 0 {
            bail!("chat.timeout_secs must be > 0");
        }
        Ok(())
    }
}

/// Collect the override keys present in the process environment.
pub fn env_layer() -> OverrideLayer {
    OVERRIDE_KEYS
        .iter()
        .flat_map(|keys| keys.iter())
        .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
        .collect()
}

/// Parse and validate a TOML config file. Does not apply overrides.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load the file (or defaults when `path` is `None`), then merge the
/// process environment over it.
pub fn resolve_config(path: Option<&Path>) -> Result<Config> {
    let base = match path {
        Some(p) => load_config(p)?,
        None => Config::default(),
    };
    let env = env_layer();
    let config = base.with_overrides(&[&env]);
    if config.chat.api_key.is_none() {
        tracing::warn!("CHAT_API_KEY (or OPENAI_API_KEY) not set; remote chat and embeddings will be rejected");
    }
    config.validate()?;
    Ok(config)
}
