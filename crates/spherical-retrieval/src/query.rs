//! Request and response shapes of the query and metadata contracts.

use serde::{Deserialize, Serialize};
use spherical_core::{
  fact::{Availability, SpecValue},
  variant::VariantAxes,
};

// ─── Query ───────────────────────────────────────────────────────────────────

/// A voice-agent query. The four powertrain/trim axes are optional and are
/// inferred from a baseline fact when missing; an empty string counts as
/// missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
  pub oem_id:       String,
  pub campaign_id:  String,
  pub model_code:   String,
  pub model_year:   i32,
  pub region:       String,
  #[serde(default)]
  pub trim:         Option<String>,
  #[serde(default)]
  pub engine_code:  Option<String>,
  #[serde(default)]
  pub transmission: Option<String>,
  #[serde(default)]
  pub fuel_type:    Option<String>,
  /// Free-text feature term, e.g. `mileage` or `Electric Windows`.
  #[serde(alias = "feature_id")]
  pub feature:      String,
}

/// How much to trust an answer.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::AsRefStr,
  strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Confidence {
  High,
  Medium,
  Low,
}

/// Extraction confidence at or above which an answer is `high`.
pub const HIGH_CONFIDENCE: f64 = 0.95;

impl Confidence {
  /// `synonym_match` is true when the fact was found under a synonym rather
  /// than the canonical id.
  pub fn label(extraction_confidence: f64, synonym_match: bool) -> Self {
    if extraction_confidence >= HIGH_CONFIDENCE {
      Self::High
    } else if synonym_match {
      Self::Low
    } else {
      Self::Medium
    }
  }
}

/// Where an answer was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOrigin {
  Cache,
  Store,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
  pub document:              String,
  pub page:                  u32,
  pub extraction_confidence: f64,
}

/// The raw fact behind an answer, for UI cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecDetails {
  /// The id the fact was stored under.
  pub feature:       String,
  pub availability:  Availability,
  pub value:         SpecValue,
  pub value_display: String,
  pub variant_id:    String,
  pub axes:          VariantAxes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossSellSuggestion {
  pub model:  String,
  pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
  /// Voice-ready sentence.
  pub answer:                 String,
  /// e.g. `According to page 4 of the wagonr.pdf`.
  pub citation:               String,
  pub confidence:             Confidence,
  pub source:                 SourceCitation,
  pub spec_details:           SpecDetails,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub cross_sell_suggestions: Vec<CrossSellSuggestion>,
  pub origin:                 AnswerOrigin,
}

// ─── Metadata ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRequest {
  pub oem_id:      String,
  pub campaign_id: String,
  pub model_code:  String,
}

/// Distinct axis values observed for a model within a campaign.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationMetadata {
  pub trims:         Vec<String>,
  pub engines:       Vec<String>,
  pub transmissions: Vec<String>,
  pub fuel_types:    Vec<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn confidence_labels() {
    assert_eq!(Confidence::label(0.95, true), Confidence::High);
    assert_eq!(Confidence::label(0.80, false), Confidence::Medium);
    assert_eq!(Confidence::label(0.80, true), Confidence::Low);
  }

  #[test]
  fn query_accepts_the_legacy_feature_field() {
    let q: QueryRequest = serde_json::from_str(
      r#"{"oem_id":"maruti_suzuki","campaign_id":"launch","model_code":"wagonr",
          "model_year":2024,"region":"IN","trim":"VXi","feature_id":"mileage"}"#,
    )
    .unwrap();
    assert_eq!(q.feature, "mileage");
    assert_eq!(q.trim.as_deref(), Some("VXi"));
    assert_eq!(q.engine_code, None);
  }
}
