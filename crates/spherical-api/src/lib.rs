//! JSON HTTP surface for Spherical.
//!
//! Exposes an axum [`Router`] over an [`Ingestor`] and a [`RetrievalEngine`]
//! sharing one [`FactStore`]. Tracing, TLS and transport concerns are the
//! binary's responsibility.

pub mod error;
pub mod handlers;
pub mod settings;

use std::sync::Arc;

use axum::{
  Router,
  extract::DefaultBodyLimit,
  routing::{get, post},
};
use spherical_core::{cache::SpecCache, store::FactStore};
use spherical_ingest::Ingestor;
use spherical_retrieval::RetrievalEngine;

pub use error::ApiError;
pub use settings::ServerConfig;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S, C> {
  pub ingestor:         Arc<Ingestor<S>>,
  pub engine:           Arc<RetrievalEngine<S, C>>,
  pub max_upload_bytes: usize,
}

impl<S, C> Clone for AppState<S, C> {
  fn clone(&self) -> Self {
    Self {
      ingestor:         self.ingestor.clone(),
      engine:           self.engine.clone(),
      max_upload_bytes: self.max_upload_bytes,
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

pub fn router<S, C>(state: AppState<S, C>) -> Router
where
  S: FactStore + 'static,
  C: SpecCache + 'static,
{
  let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);
  Router::new()
    .route("/health", get(handlers::health))
    .route(
      "/retrieval/upload",
      post(handlers::upload::handler::<S, C>).layer(upload_limit),
    )
    .route("/retrieval/query", post(handlers::query::handler::<S, C>))
    .route("/retrieval/metadata", get(handlers::metadata::handler::<S, C>))
    .with_state(state)
}
