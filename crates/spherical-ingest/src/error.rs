//! Error type for `spherical-ingest`.

use thiserror::Error;

/// Ingestion only fails on bad input or a persistence failure. Every
/// external-service problem degrades inside the pipeline instead.
#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid ingestion request: {0}")]
  InvalidRequest(String),

  /// The batch was rolled back; nothing from it is visible.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
