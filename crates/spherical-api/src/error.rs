//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Internal(e) => {
        tracing::error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}

impl From<spherical_retrieval::Error> for ApiError {
  fn from(e: spherical_retrieval::Error) -> Self {
    use spherical_retrieval::Error as E;
    match e {
      E::ConfigurationUnresolved(_) | E::InvalidQuery(_) => ApiError::BadRequest(e.to_string()),
      E::FeatureNotFound { .. } => ApiError::NotFound(e.to_string()),
      E::Store(inner) => ApiError::Internal(inner),
    }
  }
}

impl From<spherical_ingest::Error> for ApiError {
  fn from(e: spherical_ingest::Error) -> Self {
    use spherical_ingest::Error as E;
    match e {
      E::InvalidRequest(_) => ApiError::BadRequest(e.to_string()),
      E::Store(inner) => ApiError::Internal(inner),
    }
  }
}
