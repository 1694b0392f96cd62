//! The closed feature taxonomy and its inverted synonym index.
//!
//! An [`Ontology`] is built once at startup from a versioned TOML definition
//! and shared read-only (`Arc<Ontology>`) by ingestion and retrieval. The
//! synonym index is computed in the constructor and never refreshed.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  fact::{Availability, SpecValue},
};

/// Prefix of every synthesized, not-yet-reviewed feature id.
pub const EXTENSION_PREFIX: &str = "ext_unreviewed_";

/// The definition shipped with the crate.
const BUILTIN_DEFINITION: &str = include_str!("../ontology/vehicle_ontology.toml");

// ─── Definition (file format) ────────────────────────────────────────────────

/// On-disk shape of an ontology definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OntologyDefinition {
  pub version:       u32,
  #[serde(default)]
  pub features:      BTreeMap<String, FeatureDefinition>,
  /// `oem -> model -> path`.
  #[serde(default)]
  pub upgrade_paths: BTreeMap<String, BTreeMap<String, UpgradePath>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureDefinition {
  pub category:    String,
  #[serde(default)]
  pub synonyms:    Vec<String>,
  pub template:    String,
  #[serde(default)]
  pub description: Option<String>,
  /// Precomputed semantic embedding, if the definition ships one.
  #[serde(default)]
  pub embedding:   Option<Vec<f32>>,
}

/// Higher trims/models suggested alongside answers for a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradePath {
  pub next_tier:   Vec<String>,
  #[serde(default)]
  pub reason_tags: Vec<String>,
}

// ─── Entries ─────────────────────────────────────────────────────────────────

/// A canonical feature.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureEntry {
  pub id:          String,
  pub category:    String,
  pub synonyms:    Vec<String>,
  pub template:    String,
  pub description: Option<String>,
  pub embedding:   Option<Vec<f32>>,
}

impl FeatureEntry {
  /// The text embedded for semantic matching when no embedding is shipped.
  pub fn semantic_description(&self) -> String {
    format!(
      "Feature: {}\nCategory: {}\nSynonyms: {}\nDescription: {}",
      self.id,
      self.category,
      self.synonyms.join(", "),
      self.description.as_deref().unwrap_or(&self.template),
    )
  }
}

// ─── Ontology ────────────────────────────────────────────────────────────────

/// The loaded taxonomy plus its precomputed inverted index.
#[derive(Debug, Clone)]
pub struct Ontology {
  version:       u32,
  features:      BTreeMap<String, FeatureEntry>,
  /// Normalized term → canonical id.
  index:         BTreeMap<String, String>,
  upgrade_paths: BTreeMap<String, BTreeMap<String, UpgradePath>>,
}

impl Ontology {
  /// The definition embedded in the binary.
  pub fn builtin() -> Result<Self> { Self::from_toml(BUILTIN_DEFINITION) }

  /// Load a definition file from disk.
  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| {
      Error::InvalidOntology(format!("reading {}: {e}", path.display()))
    })?;
    Self::from_toml(&raw)
  }

  pub fn from_toml(raw: &str) -> Result<Self> {
    let definition: OntologyDefinition = toml::from_str(raw)?;
    Self::from_definition(definition)
  }

  /// Validate a definition and build the inverted index.
  ///
  /// Canonical ids and their space-joined forms always win over synonyms; a
  /// synonym claimed by two features keeps its first (alphabetical) owner.
  pub fn from_definition(definition: OntologyDefinition) -> Result<Self> {
    let mut features = BTreeMap::new();
    let mut dimension: Option<usize> = None;

    for (id, def) in definition.features {
      let id = id.trim().to_owned();
      if id.is_empty() {
        return Err(Error::InvalidOntology("empty feature id".into()));
      }
      if id.starts_with(EXTENSION_PREFIX) {
        return Err(Error::InvalidOntology(format!(
          "feature id {id:?} uses the reserved extension prefix"
        )));
      }
      if def.template.trim().is_empty() {
        return Err(Error::InvalidOntology(format!(
          "feature {id:?} has no template"
        )));
      }
      if let Some(embedding) = &def.embedding {
        match dimension {
          None => dimension = Some(embedding.len()),
          Some(d) if d != embedding.len() => {
            return Err(Error::InvalidOntology(format!(
              "feature {id:?} embedding has {} dimensions, expected {d}",
              embedding.len()
            )));
          }
          Some(_) => {}
        }
      }
      features.insert(id.clone(), FeatureEntry {
        id,
        category: def.category,
        synonyms: def.synonyms,
        template: def.template,
        description: def.description,
        embedding: def.embedding,
      });
    }

    let mut index = BTreeMap::new();
    for id in features.keys() {
      index.insert(normalize_term(id), id.clone());
      index
        .entry(normalize_term(&id.replace('_', " ")))
        .or_insert_with(|| id.clone());
    }
    for entry in features.values() {
      for synonym in &entry.synonyms {
        let key = normalize_term(synonym);
        if key.is_empty() {
          continue;
        }
        if let Some(owner) = index.get(&key)
          && owner != &entry.id
        {
          tracing::warn!(
            synonym = %key,
            owner = %owner,
            ignored = %entry.id,
            "synonym claimed by two features"
          );
          continue;
        }
        index.insert(key, entry.id.clone());
      }
    }

    Ok(Self {
      version: definition.version,
      features,
      index,
      upgrade_paths: definition.upgrade_paths,
    })
  }

  pub fn version(&self) -> u32 { self.version }

  pub fn len(&self) -> usize { self.features.len() }

  pub fn is_empty(&self) -> bool { self.features.is_empty() }

  pub fn feature(&self, id: &str) -> Option<&FeatureEntry> { self.features.get(id) }

  pub fn contains(&self, id: &str) -> bool { self.features.contains_key(id) }

  /// All canonical entries, ordered by id.
  pub fn features(&self) -> impl Iterator<Item = &FeatureEntry> { self.features.values() }

  /// All canonical ids, ordered.
  pub fn feature_ids(&self) -> impl Iterator<Item = &str> {
    self.features.keys().map(String::as_str)
  }

  /// The category of a canonical feature, if known.
  pub fn category_of(&self, id: &str) -> Option<&str> {
    self.features.get(id).map(|e| e.category.as_str())
  }

  /// O(1)-ish exact lookup of a raw term in the inverted index.
  pub fn lookup_exact(&self, raw_term: &str) -> Option<&str> {
    self.index.get(&normalize_term(raw_term)).map(String::as_str)
  }

  /// Every key of the inverted index, sorted.
  pub fn index_keys(&self) -> impl Iterator<Item = &str> {
    self.index.keys().map(String::as_str)
  }

  /// Canonical id for an index key (already normalized).
  pub fn index_target(&self, key: &str) -> Option<&str> {
    self.index.get(key).map(String::as_str)
  }

  /// The ids a fact for `feature_id` may have been stored under: the id
  /// itself followed by every declared synonym, verbatim and normalized.
  pub fn storage_aliases(&self, feature_id: &str) -> Vec<String> {
    let mut aliases = vec![feature_id.to_owned()];
    if let Some(entry) = self.features.get(feature_id) {
      for synonym in &entry.synonyms {
        for candidate in [synonym.clone(), normalize_term(synonym)] {
          if !aliases.contains(&candidate) {
            aliases.push(candidate);
          }
        }
      }
    }
    aliases
  }

  pub fn upgrade_path(&self, oem_id: &str, model_code: &str) -> Option<&UpgradePath> {
    self.upgrade_paths.get(oem_id)?.get(model_code)
  }

  // ── Rendering ───────────────────────────────────────────────────────────

  /// Render a fact value as a voice-friendly sentence. Never fails: unknown
  /// features and broken templates fall back to a generic phrasing.
  pub fn render_template(&self, feature_id: &str, value: &SpecValue) -> String {
    let rendered_value = value.render().unwrap_or_else(|| "unknown".to_owned());
    let unit = value.unit().unwrap_or("");

    let templated = self
      .features
      .get(feature_id)
      .and_then(|entry| substitute(&entry.template, &rendered_value, unit));

    match templated {
      Some(sentence) => tidy(&sentence),
      None => tidy(&format!(
        "The value for {} is {rendered_value} {unit}.",
        display_name(feature_id)
      )),
    }
  }

  /// Render a fact, phrasing absence explicitly instead of templating an
  /// empty or negative value.
  pub fn render_answer(
    &self,
    feature_id: &str,
    value: &SpecValue,
    availability: Availability,
  ) -> String {
    match availability {
      Availability::NotMentioned => format!(
        "{} is not mentioned in the brochure.",
        capitalize(&display_name(feature_id))
      ),
      Availability::NotAvailable => format!(
        "{} is not available on this variant.",
        capitalize(&display_name(feature_id))
      ),
      Availability::Standard | Availability::Optional => {
        self.render_template(feature_id, value)
      }
    }
  }
}

// ─── Term helpers ────────────────────────────────────────────────────────────

/// Lowercase, trim, and collapse internal whitespace.
pub fn normalize_term(raw: &str) -> String {
  raw
    .split_whitespace()
    .map(str::to_lowercase)
    .collect::<Vec<_>>()
    .join(" ")
}

/// The deterministic unreviewed-extension id for a raw term.
pub fn extension_id(raw_term: &str) -> String {
  format!("{EXTENSION_PREFIX}{}", normalize_term(raw_term).replace(' ', "_"))
}

pub fn is_extension(feature_id: &str) -> bool { feature_id.starts_with(EXTENSION_PREFIX) }

/// `ext_unreviewed_heated_seats` → `heated seats`; `power_windows` →
/// `power windows`.
pub fn display_name(feature_id: &str) -> String {
  feature_id
    .strip_prefix(EXTENSION_PREFIX)
    .unwrap_or(feature_id)
    .replace('_', " ")
}

fn capitalize(s: &str) -> String {
  let mut chars = s.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}

/// Substitute `{value}` and `{unit}`; `{{`/`}}` escape braces. `None` on any
/// other placeholder or an unbalanced brace.
fn substitute(template: &str, value: &str, unit: &str) -> Option<String> {
  let mut out = String::with_capacity(template.len() + value.len());
  let mut chars = template.chars().peekable();

  while let Some(c) = chars.next() {
    match c {
      '{' if chars.peek() == Some(&'{') => {
        chars.next();
        out.push('{');
      }
      '}' if chars.peek() == Some(&'}') => {
        chars.next();
        out.push('}');
      }
      '{' => {
        let mut name = String::new();
        loop {
          match chars.next() {
            Some('}') => break,
            Some(ch) => name.push(ch),
            None => return None,
          }
        }
        match name.trim() {
          "value" => out.push_str(value),
          "unit" => out.push_str(unit),
          _ => return None,
        }
      }
      '}' => return None,
      _ => out.push(c),
    }
  }
  Some(out)
}

/// Collapse whitespace and drop spaces left before punctuation by an empty
/// substitution.
fn tidy(sentence: &str) -> String {
  let collapsed = sentence.split_whitespace().collect::<Vec<_>>().join(" ");
  let mut out = String::with_capacity(collapsed.len());
  for c in collapsed.chars() {
    if matches!(c, '.' | ',' | '!' | '?') && out.ends_with(' ') {
      out.pop();
    }
    out.push(c);
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  const SMALL: &str = r#"
version = 1

[features.fuel_efficiency]
category = "performance"
synonyms = ["mileage", "fuel economy", "milage"]
template = "The certified mileage is {value} {unit}."

[features.power_windows]
category = "comfort_convenience"
synonyms = ["electric windows", "auto windows"]
template = "Power windows are {value}."

[features.broken]
category = "misc"
template = "Broken {valeu} template"

[upgrade_paths.maruti_suzuki.wagonr]
next_tier = ["ciaz", "brezza"]
reason_tags = ["more_power"]
"#;

  fn small() -> Ontology { Ontology::from_toml(SMALL).unwrap() }

  #[test]
  fn builtin_definition_loads() {
    let o = Ontology::builtin().unwrap();
    assert!(o.len() >= 5);
    assert_eq!(o.lookup_exact("Mileage"), Some("fuel_efficiency"));
    assert!(o.upgrade_path("maruti_suzuki", "wagonr").is_some());
  }

  #[test]
  fn exact_lookup_covers_ids_space_forms_and_synonyms() {
    let o = small();
    assert_eq!(o.lookup_exact("fuel_efficiency"), Some("fuel_efficiency"));
    assert_eq!(o.lookup_exact("  Fuel Efficiency "), Some("fuel_efficiency"));
    assert_eq!(o.lookup_exact("MILEAGE"), Some("fuel_efficiency"));
    assert_eq!(o.lookup_exact("electric   windows"), Some("power_windows"));
    assert_eq!(o.lookup_exact("heated seats"), None);
  }

  #[test]
  fn extension_ids_are_slugified() {
    assert_eq!(extension_id("Heated Seats"), "ext_unreviewed_heated_seats");
    assert_eq!(extension_id("  Heated   Seats "), "ext_unreviewed_heated_seats");
    assert!(is_extension(&extension_id("x")));
    assert_eq!(display_name("ext_unreviewed_heated_seats"), "heated seats");
  }

  #[test]
  fn rejects_reserved_prefix_and_mixed_dimensions() {
    let reserved = r#"
version = 1
[features.ext_unreviewed_x]
category = "c"
template = "{value}"
"#;
    assert!(Ontology::from_toml(reserved).is_err());

    let dims = r#"
version = 1
[features.a]
category = "c"
template = "{value}"
embedding = [1.0, 0.0]
[features.b]
category = "c"
template = "{value}"
embedding = [1.0, 0.0, 0.0]
"#;
    assert!(Ontology::from_toml(dims).is_err());
  }

  #[test]
  fn render_numeric_and_scope() {
    let o = small();
    let mileage = SpecValue::Numeric { value: 24.3, unit: Some("kmpl".into()) };
    assert_eq!(
      o.render_template("fuel_efficiency", &mileage),
      "The certified mileage is 24.3 kmpl."
    );
    let scope = SpecValue::Scope { scope: "front_and_rear".into() };
    assert_eq!(
      o.render_template("power_windows", &scope),
      "Power windows are front_and_rear."
    );
  }

  #[test]
  fn render_missing_unit_has_no_dangling_space() {
    let o = small();
    assert_eq!(
      o.render_template("fuel_efficiency", &SpecValue::text("24.35")),
      "The certified mileage is 24.35."
    );
  }

  #[test]
  fn render_falls_back_for_extensions_unknown_ids_and_broken_templates() {
    let o = small();
    assert_eq!(
      o.render_template("ext_unreviewed_heated_seats", &SpecValue::text("Yes")),
      "The value for heated seats is Yes."
    );
    assert_eq!(
      o.render_template("no_such_feature", &SpecValue::Empty),
      "The value for no such feature is unknown."
    );
    assert_eq!(
      o.render_template("broken", &SpecValue::text("x")),
      "The value for broken is x."
    );
    // Unbalanced braces must not panic either.
    assert_eq!(substitute("oops {value", "1", ""), None);
    assert_eq!(substitute("oops }", "1", ""), None);
    assert_eq!(substitute("{{literal}} {value}", "1", "").as_deref(), Some("{literal} 1"));
  }

  #[test]
  fn render_answer_phrases_absence() {
    let o = small();
    assert_eq!(
      o.render_answer("power_windows", &SpecValue::Empty, Availability::NotMentioned),
      "Power windows is not mentioned in the brochure."
    );
    assert_eq!(
      o.render_answer("power_windows", &SpecValue::text("-"), Availability::NotAvailable),
      "Power windows is not available on this variant."
    );
  }

  #[test]
  fn storage_aliases_start_with_canonical_id() {
    let o = small();
    let aliases = o.storage_aliases("fuel_efficiency");
    assert_eq!(aliases[0], "fuel_efficiency");
    assert!(aliases.contains(&"mileage".to_owned()));
    assert_eq!(o.storage_aliases("ext_unreviewed_x"), vec!["ext_unreviewed_x"]);
  }
}
