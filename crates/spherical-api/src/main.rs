//! Spherical server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered with
//! `SPHERICAL_*` environment variables, opens the SQLite fact store and spec
//! cache, wires the table parsers and language services, and serves the JSON
//! API over HTTP.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use clap::Parser;
use spherical_api::{AppState, ServerConfig};
use spherical_core::{
  ontology::Ontology,
  resolver::{FeatureResolver, SemanticMatch, SemanticOptions},
  services::TableParser,
};
use spherical_ingest::{FallbackParser, Ingestor, TableFlattener, VariantUnifier};
use spherical_retrieval::RetrievalEngine;
use spherical_services::{HttpTableParser, LlmClient, VisionTableParser};
use spherical_store_sqlite::{SqliteCache, SqliteStore};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// How often expired cache rows are purged.
const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Parser)]
#[command(author, version, about = "Spherical spec-fact server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = ServerConfig::load(&cli.config).context("failed to load configuration")?;

  let ontology = Arc::new(match &cfg.ontology_path {
    Some(path) => {
      let path = expand_tilde(path);
      Ontology::load(&path).with_context(|| format!("failed to load ontology from {path:?}"))?
    }
    None => Ontology::builtin().context("embedded ontology is invalid")?,
  });
  tracing::info!(version = ontology.version(), features = ontology.len(), "ontology loaded");

  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let cache_path = expand_tilde(&cfg.cache_path);
  let cache = SqliteCache::open(&cache_path)
    .await
    .with_context(|| format!("failed to open cache at {cache_path:?}"))?;

  let llm = cfg
    .llm
    .clone()
    .map(LlmClient::new)
    .transpose()
    .context("invalid llm configuration")?;

  // Resolver cascade; the semantic stage needs an embedding service.
  let mut resolver = FeatureResolver::new(ontology.clone());
  match &llm {
    Some(llm) => {
      let options = SemanticOptions {
        timeout: cfg.semantic_timeout(),
        max_concurrency: cfg.semantic_max_concurrency,
        ..Default::default()
      };
      let semantic = SemanticMatch::prime(&ontology, Arc::new(llm.clone()), options).await;
      if semantic.is_empty() {
        tracing::warn!("no ontology embeddings available; semantic stage disabled");
      } else {
        resolver = resolver.with_strategy(semantic);
      }
    }
    None => tracing::warn!("no llm configured; semantic stage disabled"),
  }
  let resolver = Arc::new(resolver);

  let unifier = match &llm {
    Some(llm) => VariantUnifier::new(Arc::new(llm.clone()), cfg.unify_timeout()),
    None => VariantUnifier::identity(),
  };

  // Table parsing: primary service, then the vision fallback.
  let primary = HttpTableParser::new(cfg.table_parser_url.clone(), cfg.parser_timeout())
    .context("invalid table_parser_url")?;
  let mut parser = FallbackParser::new("tables", Arc::new(primary));
  let vision: Option<Arc<dyn TableParser>> = match (&cfg.vision_parser_url, &llm) {
    (Some(url), _) => Some(Arc::new(
      HttpTableParser::new(url.clone(), cfg.parser_timeout()).context("invalid vision_parser_url")?,
    )),
    (None, Some(llm)) => Some(Arc::new(VisionTableParser::new(llm.clone()))),
    (None, None) => None,
  };
  if let Some(vision) = vision {
    parser = parser.or_else("vision", vision);
  }

  let store = Arc::new(store);
  let cache = Arc::new(cache);
  let flattener = TableFlattener::new(ontology.clone(), resolver.clone(), unifier);
  let state = AppState {
    ingestor:         Arc::new(Ingestor::new(
      store.clone(),
      ontology.clone(),
      Arc::new(parser),
      flattener,
    )),
    engine:           Arc::new(
      RetrievalEngine::new(store, cache.clone(), ontology, resolver).with_ttl(cfg.cache_ttl()),
    ),
    max_upload_bytes: cfg.max_upload_bytes,
  };

  tokio::spawn(purge_cache(cache));

  let app = spherical_api::router(state).layer(TraceLayer::new_for_http());
  let address = cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

async fn purge_cache(cache: Arc<SqliteCache>) {
  let mut interval = tokio::time::interval(CACHE_PURGE_INTERVAL);
  loop {
    interval.tick().await;
    match cache.purge_expired().await {
      Ok(0) => {}
      Ok(purged) => tracing::info!(purged, "purged expired cache entries"),
      Err(e) => tracing::warn!(error = %e, "cache purge failed"),
    }
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
