//! Fact types — the atomic unit of the spec store.
//!
//! A fact is one feature's value for one variant within one campaign. Facts
//! are written in bulk by ingestion and by the completeness enforcer and are
//! read-only everywhere else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::variant::VariantAxes;

/// Priority rank of synthetic facts; sorts after every real source.
pub const SYNTHETIC_SOURCE_PRIORITY: u32 = 999;

/// Document id recorded on completeness stubs.
pub const SYNTHETIC_SOURCE_DOCUMENT: &str = "synthetic_completeness_validator";

/// Drive type assumed when a brochure does not state one.
pub const DEFAULT_DRIVE_TYPE: &str = "FWD";

// ─── Availability ────────────────────────────────────────────────────────────

/// Whether a feature is fitted on a variant.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::AsRefStr,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Availability {
  Standard,
  Optional,
  NotAvailable,
  /// Reserved for completeness stubs; never produced from a table cell.
  NotMentioned,
}

impl Availability {
  /// `true` when the fact asserts the feature exists in some form.
  pub fn is_populated(self) -> bool {
    matches!(self, Self::Standard | Self::Optional)
  }
}

// ─── Value ───────────────────────────────────────────────────────────────────

/// The structured value of a fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpecValue {
  /// A measurement, e.g. `24.35 km/l`.
  Numeric {
    value: f64,
    unit:  Option<String>,
  },
  /// Free text straight from the cell, e.g. `Standard` or `K12N`.
  Text { text: String },
  /// Where a feature applies, e.g. `front_and_rear`.
  Scope { scope: String },
  /// No value at all (completeness stubs).
  Empty,
}

impl SpecValue {
  pub fn text(text: impl Into<String>) -> Self { Self::Text { text: text.into() } }

  /// The value rendered for speech, without its unit. `None` for
  /// [`SpecValue::Empty`].
  pub fn render(&self) -> Option<String> {
    match self {
      Self::Numeric { value, .. } => Some(format_number(*value)),
      Self::Text { text } => Some(text.clone()),
      Self::Scope { scope } => Some(scope.clone()),
      Self::Empty => None,
    }
  }

  pub fn unit(&self) -> Option<&str> {
    match self {
      Self::Numeric { unit, .. } => unit.as_deref(),
      _ => None,
    }
  }

  pub fn is_empty(&self) -> bool { matches!(self, Self::Empty) }
}

/// Format a number without a trailing `.0` for whole values.
pub fn format_number(value: f64) -> String {
  if value.fract() == 0.0 && value.abs() < 1e15 {
    format!("{value:.0}")
  } else {
    value.to_string()
  }
}

// ─── Provenance ──────────────────────────────────────────────────────────────

/// The kind of document a fact was extracted from. Lower precedence wins
/// when several documents disagree.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::AsRefStr,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceType {
  SpecSheet,
  #[default]
  Brochure,
  Marketing,
}

impl SourceType {
  pub fn precedence(self) -> u32 {
    match self {
      Self::SpecSheet => 1,
      Self::Brochure => 2,
      Self::Marketing => 3,
    }
  }
}

/// Where a fact came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
  pub document_id: String,
  /// 1-based page number; `0` for synthetic facts.
  pub page:        u32,
  /// Source-type precedence rank (see [`SourceType::precedence`]).
  pub priority:    u32,
}

impl SourceRef {
  pub fn synthetic() -> Self {
    Self {
      document_id: SYNTHETIC_SOURCE_DOCUMENT.to_owned(),
      page:        0,
      priority:    SYNTHETIC_SOURCE_PRIORITY,
    }
  }
}

// ─── Fact ────────────────────────────────────────────────────────────────────

/// A persisted fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
  pub fact_id:               Uuid,
  pub variant_id:            String,
  pub campaign_id:           String,
  pub axes:                  VariantAxes,
  pub drive_type:            String,
  pub feature_id:            String,
  pub category:              String,
  pub value:                 SpecValue,
  pub availability:          Availability,
  pub source:                SourceRef,
  /// In `[0, 1]`.
  pub extraction_confidence: f64,
  /// Precomputed human-readable value, e.g. `24.35 km/l`.
  pub value_display:         String,
  /// Server-assigned; never accepted from callers.
  pub recorded_at:           DateTime<Utc>,
}

// ─── NewFact ─────────────────────────────────────────────────────────────────

/// Input to [`crate::store::FactStore::upsert_facts`]. The store assigns
/// `fact_id` and `recorded_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFact {
  pub variant_id:            String,
  pub campaign_id:           String,
  pub axes:                  VariantAxes,
  pub drive_type:            String,
  pub feature_id:            String,
  pub category:              String,
  pub value:                 SpecValue,
  pub availability:          Availability,
  pub source:                SourceRef,
  pub extraction_confidence: f64,
  pub value_display:         String,
}

impl From<&Fact> for NewFact {
  fn from(fact: &Fact) -> Self {
    Self {
      variant_id:            fact.variant_id.clone(),
      campaign_id:           fact.campaign_id.clone(),
      axes:                  fact.axes.clone(),
      drive_type:            fact.drive_type.clone(),
      feature_id:            fact.feature_id.clone(),
      category:              fact.category.clone(),
      value:                 fact.value.clone(),
      availability:          fact.availability,
      source:                fact.source.clone(),
      extraction_confidence: fact.extraction_confidence,
      value_display:         fact.value_display.clone(),
    }
  }
}

impl NewFact {
  /// The completeness stub for `feature_id` on the variant described by
  /// `template`, which must be a fact of that same variant.
  pub fn not_mentioned(template: &NewFact, feature_id: &str, category: &str) -> Self {
    Self {
      variant_id:            template.variant_id.clone(),
      campaign_id:           template.campaign_id.clone(),
      axes:                  template.axes.clone(),
      drive_type:            template.drive_type.clone(),
      feature_id:            feature_id.to_owned(),
      category:              category.to_owned(),
      value:                 SpecValue::Empty,
      availability:          Availability::NotMentioned,
      source:                SourceRef::synthetic(),
      extraction_confidence: 1.0,
      value_display:         "Not mentioned in brochure".to_owned(),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::str::FromStr as _;

  use super::*;

  #[test]
  fn availability_string_forms() {
    assert_eq!(Availability::NotAvailable.as_ref(), "not_available");
    for availability in [
      Availability::Standard,
      Availability::Optional,
      Availability::NotAvailable,
      Availability::NotMentioned,
    ] {
      let column: &'static str = availability.into();
      assert_eq!(Availability::from_str(column).unwrap(), availability);
    }
    assert_eq!(
      Availability::from_str("not_mentioned").unwrap(),
      Availability::NotMentioned
    );
    assert_eq!(
      serde_json::to_string(&Availability::Optional).unwrap(),
      "\"optional\""
    );
  }

  #[test]
  fn numbers_render_without_trailing_zero() {
    assert_eq!(format_number(1000.0), "1000");
    assert_eq!(format_number(24.3), "24.3");
    assert_eq!(format_number(-3.0), "-3");
  }

  #[test]
  fn value_render_and_unit() {
    let v = SpecValue::Numeric { value: 24.35, unit: Some("km/l".into()) };
    assert_eq!(v.render().as_deref(), Some("24.35"));
    assert_eq!(v.unit(), Some("km/l"));
    assert_eq!(SpecValue::Empty.render(), None);
    assert_eq!(SpecValue::text("Standard").unit(), None);
  }

  #[test]
  fn source_type_precedence() {
    assert!(SourceType::SpecSheet.precedence() < SourceType::Brochure.precedence());
    assert_eq!(SourceType::from_str("marketing").unwrap(), SourceType::Marketing);
    assert!(SourceType::Marketing.precedence() < SYNTHETIC_SOURCE_PRIORITY);
  }
}
