//! The key-value cache contract used by the retrieval read path.

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};

use crate::fact::{Availability, Fact, SpecValue};

/// Default time-to-live of a cached spec.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache key for one feature of one variant.
pub fn cache_key(variant_id: &str, feature_id: &str) -> String {
  format!("{}{feature_id}", variant_key_prefix(variant_id))
}

/// Prefix shared by every cache key of one variant.
pub fn variant_key_prefix(variant_id: &str) -> String { format!("spec:{variant_id}:") }

/// The fact payload stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSpec {
  /// The id the fact was actually stored under (canonical or a synonym).
  pub feature_id:            String,
  pub value:                 SpecValue,
  pub availability:          Availability,
  pub source_document:       String,
  pub source_page:           u32,
  pub extraction_confidence: f64,
  pub value_display:         String,
}

impl From<&Fact> for CachedSpec {
  fn from(fact: &Fact) -> Self {
    Self {
      feature_id:            fact.feature_id.clone(),
      value:                 fact.value.clone(),
      availability:          fact.availability,
      source_document:       fact.source.document_id.clone(),
      source_page:           fact.source.page,
      extraction_confidence: fact.extraction_confidence,
      value_display:         fact.value_display.clone(),
    }
  }
}

/// A best-effort key-value cache. Callers treat every error as a miss.
pub trait SpecCache: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// `None` on a miss or an expired entry.
  fn get<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<CachedSpec>, Self::Error>> + Send + 'a;

  /// Insert or overwrite `key`, expiring after `ttl`.
  fn set(
    &self,
    key: String,
    payload: CachedSpec,
    ttl: Duration,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Drop every entry of `variant_id`, returning how many were removed.
  fn invalidate_variant<'a>(
    &'a self,
    variant_id: &'a str,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;
}
