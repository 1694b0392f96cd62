//! Error types for `spherical-retrieval`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Required structural axes are missing and no baseline fact exists to
  /// infer them from.
  #[error("configuration could not be resolved: {0}")]
  ConfigurationUnresolved(String),

  #[error("feature {feature_id:?} not found for variant {variant_id}")]
  FeatureNotFound { feature_id: String, variant_id: String },

  #[error("invalid query: {0}")]
  InvalidQuery(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
