//! Variant identity — the join key between ingestion and retrieval.
//!
//! A variant is never stored as an entity of its own. It is the digest of the
//! eight structural axes of a configuration, so two configurations with
//! identical axis values always collapse to the same identifier.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Delimiter placed between axis values before hashing. Axis values are
/// encoded as UTF-8.
pub const AXIS_SEPARATOR: char = '|';

/// Number of digest bytes kept in a variant identifier (128 bits).
const VARIANT_ID_BYTES: usize = 16;

/// Derive the deterministic variant identifier for a configuration.
///
/// The fields are joined in this exact order with [`AXIS_SEPARATOR`], hashed
/// with SHA-256, truncated to 128 bits and hex-encoded (32 lowercase chars).
/// Empty fields are hashed as-is; rejecting incomplete configurations is the
/// caller's job.
#[allow(clippy::too_many_arguments)]
pub fn derive_variant_id(
  oem_id: &str,
  model_code: &str,
  model_year: i32,
  trim: &str,
  engine_code: &str,
  transmission: &str,
  fuel_type: &str,
  region: &str,
) -> String {
  let year = model_year.to_string();
  let fields = [
    oem_id,
    model_code,
    year.as_str(),
    trim,
    engine_code,
    transmission,
    fuel_type,
    region,
  ];

  let mut hasher = Sha256::new();
  for (i, field) in fields.iter().enumerate() {
    if i > 0 {
      let mut buf = [0u8; 4];
      hasher.update(AXIS_SEPARATOR.encode_utf8(&mut buf).as_bytes());
    }
    hasher.update(field.as_bytes());
  }
  let digest = hasher.finalize();
  hex::encode(&digest[..VARIANT_ID_BYTES])
}

// ─── Axes ────────────────────────────────────────────────────────────────────

/// The eight structural axes that identify a variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantAxes {
  pub oem_id:       String,
  pub model_code:   String,
  pub model_year:   i32,
  pub region:       String,
  /// Marketing trim, e.g. `VXi`.
  pub trim:         String,
  /// e.g. `K12N`.
  pub engine_code:  String,
  /// e.g. `MT`, `AMT`.
  pub transmission: String,
  /// e.g. `petrol`, `CNG`.
  pub fuel_type:    String,
}

impl VariantAxes {
  pub fn variant_id(&self) -> String {
    derive_variant_id(
      &self.oem_id,
      &self.model_code,
      self.model_year,
      &self.trim,
      &self.engine_code,
      &self.transmission,
      &self.fuel_type,
      &self.region,
    )
  }
}

/// One powertrain configuration (engine, transmission, fuel) that an
/// ingestion batch cross-expands every table against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PowertrainConfig {
  pub engine_code:  String,
  pub transmission: String,
  pub fuel_type:    String,
}

impl PowertrainConfig {
  pub fn new(
    engine_code: impl Into<String>,
    transmission: impl Into<String>,
    fuel_type: impl Into<String>,
  ) -> Self {
    Self {
      engine_code:  engine_code.into(),
      transmission: transmission.into(),
      fuel_type:    fuel_type.into(),
    }
  }

  /// Non-empty tokens used to pick a sub-value out of a multi-value cell,
  /// in match priority order: fuel, engine, transmission.
  pub fn match_tokens(&self) -> impl Iterator<Item = &str> {
    [
      self.fuel_type.as_str(),
      self.engine_code.as_str(),
      self.transmission.as_str(),
    ]
    .into_iter()
    .map(str::trim)
    .filter(|t| !t.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn wagonr() -> VariantAxes {
    VariantAxes {
      oem_id:       "maruti_suzuki".into(),
      model_code:   "wagonr".into(),
      model_year:   2024,
      region:       "IN".into(),
      trim:         "VXi".into(),
      engine_code:  "K12N".into(),
      transmission: "AMT".into(),
      fuel_type:    "petrol".into(),
    }
  }

  #[test]
  fn variant_id_is_deterministic() {
    let a = wagonr().variant_id();
    let b = wagonr().variant_id();
    assert_eq!(a, b);
    assert_eq!(a.len(), 32);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn variant_id_matches_free_function() {
    let axes = wagonr();
    assert_eq!(
      axes.variant_id(),
      derive_variant_id(
        "maruti_suzuki",
        "wagonr",
        2024,
        "VXi",
        "K12N",
        "AMT",
        "petrol",
        "IN"
      )
    );
  }

  #[test]
  fn changing_any_single_axis_changes_the_id() {
    let base = wagonr();
    let base_id = base.variant_id();

    let mutations: Vec<Box<dyn Fn(&mut VariantAxes)>> = vec![
      Box::new(|a| a.oem_id.push('x')),
      Box::new(|a| a.model_code.push('x')),
      Box::new(|a| a.model_year += 1),
      Box::new(|a| a.region.push('x')),
      Box::new(|a| a.trim = "ZXi".into()),
      Box::new(|a| a.engine_code.push('x')),
      Box::new(|a| a.transmission = "MT".into()),
      Box::new(|a| a.fuel_type = "CNG".into()),
    ];

    for mutate in mutations {
      let mut axes = base.clone();
      mutate(&mut axes);
      assert_ne!(axes.variant_id(), base_id, "{axes:?}");
    }
  }

  #[test]
  fn field_boundaries_are_not_ambiguous() {
    // "VXi" + "K12N" must not collide with "VXiK" + "12N".
    let a = derive_variant_id("o", "m", 2024, "VXi", "K12N", "MT", "p", "IN");
    let b = derive_variant_id("o", "m", 2024, "VXiK", "12N", "MT", "p", "IN");
    assert_ne!(a, b);
  }

  #[test]
  fn empty_fields_still_hash() {
    let a = derive_variant_id("", "", 0, "", "", "", "", "");
    let b = derive_variant_id("", "", 0, "", "", "", "", "");
    assert_eq!(a, b);
    assert_eq!(a.len(), 32);
  }

  #[test]
  fn match_tokens_skip_blank_axes() {
    let cfg = PowertrainConfig::new("K12N", " ", "CNG");
    let tokens: Vec<_> = cfg.match_tokens().collect();
    assert_eq!(tokens, vec!["CNG", "K12N"]);
  }
}
