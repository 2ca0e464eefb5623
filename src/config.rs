//! Configuration parsing.
//!
//! Settings come from an optional TOML file, then `DOCQA_*` environment
//! overrides are applied once and the result is validated. The resolved
//! [`Config`] is passed explicitly to every component; nothing reads the
//! environment at call time.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Primary persisted store location.
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
    /// Manifest file; defaults to `<dir>/processed_files.json`.
    #[serde(default)]
    pub manifest_path: Option<PathBuf>,
    /// Local writable copy used when the primary cannot be opened.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Scratch location for the empty degraded-mode store.
    #[serde(default = "default_fallback_dir")]
    pub fallback_dir: PathBuf,
    #[serde(default = "default_copy_retries")]
    pub copy_retries: u32,
    #[serde(default = "default_copy_backoff_ms")]
    pub copy_backoff_ms: u64,
    #[serde(default = "default_true")]
    pub skip_manifest_in_cache_copy: bool,
    /// Number of persisted chunks returned per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
            manifest_path: None,
            cache_dir: default_cache_dir(),
            fallback_dir: default_fallback_dir(),
            copy_retries: default_copy_retries(),
            copy_backoff_ms: default_copy_backoff_ms(),
            skip_manifest_in_cache_copy: true,
            top_k: default_top_k(),
        }
    }
}

impl StoreConfig {
    pub fn manifest_path(&self) -> PathBuf {
        self.manifest_path
            .clone()
            .unwrap_or_else(|| self.dir.join(crate::manifest::DEFAULT_FILE_NAME))
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./data/store")
}
fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("docqa-cache")
}
fn default_fallback_dir() -> PathBuf {
    std::env::temp_dir().join("docqa-ephemeral")
}
fn default_copy_retries() -> u32 {
    5
}
fn default_copy_backoff_ms() -> u64 {
    1000
}
fn default_top_k() -> usize {
    4
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Default root for `docqa ingest` when none is given.
    #[serde(default = "default_uploads_dir")]
    pub root: PathBuf,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            root: default_uploads_dir(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

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
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// OpenAI-compatible base URL; defaults to `OPENAI_BASE_URL` or the public API.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Model used when a request does not name one.
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            url: None,
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            timeout_secs: default_chat_timeout_secs(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    1.0
}
fn default_chat_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_tesseract_cmd")]
    pub tesseract_cmd: PathBuf,
    #[serde(default)]
    pub tessdata_dir: Option<PathBuf>,
    #[serde(default = "default_ocr_lang")]
    pub lang: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_cmd: default_tesseract_cmd(),
            tessdata_dir: None,
            lang: default_ocr_lang(),
        }
    }
}

fn default_tesseract_cmd() -> PathBuf {
    PathBuf::from("tesseract")
}
fn default_ocr_lang() -> String {
    "eng".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub debug: bool,
}

/// Load configuration from an optional TOML file, apply `DOCQA_*` overrides
/// from the process environment, and validate.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| "Failed to parse config file")?
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Apply environment-style overrides. `lookup` abstracts the environment so
/// the mapping can be exercised without mutating process state.
pub fn apply_env_overrides(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(v) = lookup("DOCQA_STORE_DIR") {
        config.store.dir = PathBuf::from(v);
    }
    if let Some(v) = lookup("DOCQA_MANIFEST_FILE") {
        config.store.manifest_path = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("DOCQA_CACHE_DIR") {
        config.store.cache_dir = PathBuf::from(v);
    }
    if let Some(v) = lookup("DOCQA_FALLBACK_DIR") {
        config.store.fallback_dir = PathBuf::from(v);
    }
    if let Some(v) = lookup("DOCQA_UPLOADS_DIR") {
        config.ingest.root = PathBuf::from(v);
    }
    if let Some(v) = lookup("DOCQA_EMBED_BATCH_SIZE") {
        config.embedding.batch_size = v
            .trim()
            .parse()
            .with_context(|| format!("DOCQA_EMBED_BATCH_SIZE is not a number: '{}'", v))?;
    }
    if let Some(v) = lookup("DOCQA_COPY_RETRIES") {
        config.store.copy_retries = v
            .trim()
            .parse()
            .with_context(|| format!("DOCQA_COPY_RETRIES is not a number: '{}'", v))?;
    }
    if let Some(v) = lookup("DOCQA_DEBUG") {
        config.logging.debug = parse_flag(&v);
    }
    if let Some(v) = lookup("DOCQA_CACHE_SKIP_MANIFEST") {
        config.store.skip_manifest_in_cache_copy = parse_flag(&v);
    }
    Ok(())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.store.copy_retries == 0 {
        bail!("store.copy_retries must be >= 1");
    }
    if config.store.top_k == 0 {
        bail!("store.top_k must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or local.",
            other
        ),
    }

    Ok(())
}
