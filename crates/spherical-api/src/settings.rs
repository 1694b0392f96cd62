//! Runtime server configuration, deserialised from `config.toml` layered with
//! `SPHERICAL_*` environment variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use spherical_services::LlmConfig;

fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 8000 }
fn default_cache_ttl_secs() -> u64 { 24 * 60 * 60 }
fn default_max_upload_bytes() -> usize { 50 * 1024 * 1024 }
fn default_parser_timeout_secs() -> u64 { 120 }
fn default_semantic_timeout_ms() -> u64 { 5_000 }
fn default_semantic_max_concurrency() -> usize { 4 }
fn default_unify_timeout_secs() -> u64 { 30 }

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                      String,
  #[serde(default = "default_port")]
  pub port:                      u16,
  pub store_path:                PathBuf,
  pub cache_path:                PathBuf,
  /// Replaces the embedded ontology definition when set.
  #[serde(default)]
  pub ontology_path:             Option<PathBuf>,
  #[serde(default = "default_cache_ttl_secs")]
  pub cache_ttl_secs:            u64,
  #[serde(default = "default_max_upload_bytes")]
  pub max_upload_bytes:          usize,

  /// Primary table-extraction service.
  pub table_parser_url:          String,
  /// Fallback extraction service. Without it, the vision model configured
  /// under `llm` is used as the fallback (if any).
  #[serde(default)]
  pub vision_parser_url:         Option<String>,
  #[serde(default = "default_parser_timeout_secs")]
  pub parser_timeout_secs:       u64,

  /// Embeddings, variant unification and vision extraction. All three
  /// degrade to their heuristic fallbacks when unset.
  #[serde(default)]
  pub llm:                       Option<LlmConfig>,
  #[serde(default = "default_semantic_timeout_ms")]
  pub semantic_timeout_ms:       u64,
  #[serde(default = "default_semantic_max_concurrency")]
  pub semantic_max_concurrency:  usize,
  #[serde(default = "default_unify_timeout_secs")]
  pub unify_timeout_secs:        u64,
}

impl ServerConfig {
  /// Read `path` (optional) and overlay `SPHERICAL_*` variables. Nested keys
  /// use a double underscore, e.g. `SPHERICAL_LLM__API_KEY`.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    Config::builder()
      .add_source(File::from(path).required(false))
      .add_source(
        Environment::with_prefix("SPHERICAL")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn cache_ttl(&self) -> Duration { Duration::from_secs(self.cache_ttl_secs) }

  pub fn parser_timeout(&self) -> Duration { Duration::from_secs(self.parser_timeout_secs) }

  pub fn semantic_timeout(&self) -> Duration { Duration::from_millis(self.semantic_timeout_ms) }

  pub fn unify_timeout(&self) -> Duration { Duration::from_secs(self.unify_timeout_secs) }
}
