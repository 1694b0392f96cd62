//! `GET /retrieval/metadata?oem_id=&campaign_id=&model_code=`

use axum::{
  Json,
  extract::{Query, State},
};
use spherical_core::{cache::SpecCache, store::FactStore};
use spherical_retrieval::{ConfigurationMetadata, MetadataRequest};

use crate::{AppState, error::ApiError};

pub async fn handler<S, C>(
  State(state): State<AppState<S, C>>,
  Query(params): Query<MetadataRequest>,
) -> Result<Json<ConfigurationMetadata>, ApiError>
where
  S: FactStore + 'static,
  C: SpecCache + 'static,
{
  let metadata = state.engine.metadata(&params).await?;
  Ok(Json(metadata))
}
