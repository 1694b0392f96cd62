//! `POST /retrieval/query` — one feature question for one variant.

use axum::{Json, extract::State};
use spherical_core::{cache::SpecCache, store::FactStore};
use spherical_retrieval::{Answer, QueryRequest};

use crate::{AppState, error::ApiError};

/// Body: [`QueryRequest`]. 400 when the configuration cannot be resolved,
/// 404 when the variant has no such feature.
pub async fn handler<S, C>(
  State(state): State<AppState<S, C>>,
  Json(request): Json<QueryRequest>,
) -> Result<Json<Answer>, ApiError>
where
  S: FactStore + 'static,
  C: SpecCache + 'static,
{
  let answer = state.engine.query(&request).await?;
  Ok(Json(answer))
}
