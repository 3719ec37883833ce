//! Layered configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults, `config.toml`, `config.<env>.toml`
//! and `APP_*` env vars (nested keys separated by `__`, e.g.
//! `APP_CHUNKING__MAX_WORDS=200`). [`Settings`] is the typed view consumed by
//! the pipeline and the CLI.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunker::ChunkParams;
use crate::error::Error;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate()?;
        Ok(config)
    }

    /// Build from an explicit figment, e.g. an in-memory TOML string in tests.
    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config = Self { figment: Figment::from(Serialized::defaults(Settings::default())).merge(figment) };
        config.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))
    }

    fn validate(&self) -> anyhow::Result<()> {
        let s = self.settings()?;
        if s.chunking.max_words == 0 {
            return Err(Error::InvalidConfig("chunking.max_words must be positive".into()).into());
        }
        if !(0.0..=1.0).contains(&s.search.alpha) {
            return Err(Error::InvalidConfig(format!("search.alpha must be within 0..=1, got {}", s.search.alpha)).into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunking: ChunkParams,
    pub search: SearchSettings,
    pub cache: CacheSettings,
    pub embed: EmbedSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Weight of the dense similarity in deep-mode fusion.
    pub alpha: f32,
    pub quick_top_k: usize,
    pub faiss_k: usize,
    pub rerank_k: usize,
}

impl Default for SearchSettings {
    fn default() -> Self { Self { alpha: 0.6, quick_top_k: 5, faiss_k: 500, rerank_k: 10 } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub quick_ttl_secs: u64,
    pub deep_ttl_secs: u64,
    pub lock_ttl_secs: u64,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
    pub redis_url: Option<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { quick_ttl_secs: 60, deep_ttl_secs: 30, lock_ttl_secs: 30, poll_interval_ms: 200, max_polls: 30, redis_url: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedSettings {
    /// `local`, `openai` or `hashed`.
    pub provider: String,
    pub model: Option<String>,
    /// Output dimension of the hashed provider.
    pub dim: usize,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
}

impl Default for EmbedSettings {
    fn default() -> Self {
        Self { provider: "local".to_string(), model: None, dim: 384, openai_api_key: None, openai_base_url: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub dir: String,
    /// `flat` (in-memory, persisted on save) or `lance`.
    pub backend: String,
}

impl Default for StorageSettings {
    fn default() -> Self { Self { dir: "vector_store".to_string(), backend: "flat".to_string() } }
}

impl StorageSettings {
    pub fn resolved_dir(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.dir) }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
