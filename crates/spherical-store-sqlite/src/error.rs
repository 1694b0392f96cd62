//! Error type for `spherical-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored enum column held an unknown value.
  #[error("cannot decode column {column}: {value:?}")]
  Decode { column: &'static str, value: String },

  /// The variant id on a fact does not match the digest of its axes.
  #[error("fact for {feature_id} carries variant id {found}, axes hash to {expected}")]
  VariantMismatch {
    feature_id: String,
    expected:   String,
    found:      String,
  },

  /// A fact in a replacement batch belongs to another campaign.
  #[error("fact for {feature_id} belongs to {oem_id}/{campaign_id}, not the campaign being replaced")]
  CampaignMismatch {
    feature_id:  String,
    oem_id:      String,
    campaign_id: String,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
