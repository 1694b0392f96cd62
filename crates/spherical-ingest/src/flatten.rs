//! The Table Flattener: parsed table fragments in, one fact per
//! (variant, feature) out.

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use spherical_core::{
  fact::{NewFact, SourceRef, SourceType},
  ontology::{Ontology, is_extension},
  resolver::FeatureResolver,
  services::{ParsedTable, is_blank_cell},
  variant::{PowertrainConfig, VariantAxes},
};

use crate::{
  cells::{classify_availability, disambiguate, parse_value},
  table::{TableLayout, is_section_row},
  unify::VariantUnifier,
};

/// Confidence recorded on every extracted fact.
pub const DEFAULT_EXTRACTION_CONFIDENCE: f64 = 0.80;

/// Category of an unreviewed feature with no usable hint.
pub const UNCATEGORIZED: &str = "uncategorized";

/// The structural context shared by every fact of one ingestion batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSpec {
  pub oem_id:      String,
  pub campaign_id: String,
  pub model_code:  String,
  pub model_year:  i32,
  pub region:      String,
  pub drive_type:  String,
  pub source_type: SourceType,
  /// Every table is cross-expanded against each of these.
  pub configs:     Vec<PowertrainConfig>,
}

impl BatchSpec {
  fn axes(&self, trim: &str, config: &PowertrainConfig) -> VariantAxes {
    VariantAxes {
      oem_id:       self.oem_id.clone(),
      model_code:   self.model_code.clone(),
      model_year:   self.model_year,
      region:       self.region.clone(),
      trim:         trim.to_owned(),
      engine_code:  config.engine_code.clone(),
      transmission: config.transmission.clone(),
      fuel_type:    config.fuel_type.clone(),
    }
  }
}

/// Output of [`TableFlattener::flatten`].
#[derive(Debug, Clone, Default)]
pub struct Flattened {
  pub facts:          Vec<NewFact>,
  pub tables_seen:    usize,
  pub tables_skipped: usize,
}

pub struct TableFlattener {
  ontology:   Arc<Ontology>,
  resolver:   Arc<FeatureResolver>,
  unifier:    VariantUnifier,
  confidence: f64,
}

impl TableFlattener {
  pub fn new(ontology: Arc<Ontology>, resolver: Arc<FeatureResolver>, unifier: VariantUnifier) -> Self {
    Self {
      ontology,
      resolver,
      unifier,
      confidence: DEFAULT_EXTRACTION_CONFIDENCE,
    }
  }

  pub fn with_confidence(mut self, confidence: f64) -> Self {
    self.confidence = confidence.clamp(0.0, 1.0);
    self
  }

  /// Flatten `tables` for `batch`. Malformed fragments are skipped; the
  /// result is deduplicated on (variant id, feature id).
  pub async fn flatten(&self, document_id: &str, tables: &[ParsedTable], batch: &BatchSpec) -> Flattened {
    let mut out = Flattened { tables_seen: tables.len(), ..Default::default() };

    let mut layouts = Vec::with_capacity(tables.len());
    for (i, table) in tables.iter().enumerate() {
      match TableLayout::detect(table) {
        Some(layout) => layouts.push((table, layout)),
        None => {
          tracing::warn!(table = i, page = table.page, "skipping malformed table");
          out.tables_skipped += 1;
        }
      }
    }

    let labels: Vec<&str> = layouts
      .iter()
      .flat_map(|(_, layout)| layout.trims.iter().map(|t| t.label.as_str()))
      .collect();
    let trims = self.unifier.unify(labels).await;

    let mut dedup = Dedup::default();
    for (table, layout) in &layouts {
      for row in table.rows.iter().skip(layout.first_data_row()) {
        let Some(label) = row.first().map(|l| l.trim()) else {
          continue;
        };
        if is_section_row(label) {
          continue;
        }

        let hint = layout
          .category_column
          .and_then(|c| row.get(c))
          .map(|h| h.trim())
          .filter(|h| !is_blank_cell(h));
        let feature_id = self.resolver.resolve(label, hint).await.feature_id;
        let category = self.category_for(&feature_id, hint);

        for column in &layout.trims {
          let trim = trims.get(&column.label).map_or(column.label.as_str(), String::as_str);
          let cell = row.get(column.column).map_or("", String::as_str);

          for config in &batch.configs {
            let text = disambiguate(cell, config);
            let availability = classify_availability(&text);
            let axes = batch.axes(trim, config);
            dedup.offer(NewFact {
              variant_id: axes.variant_id(),
              campaign_id: batch.campaign_id.clone(),
              axes,
              drive_type: batch.drive_type.clone(),
              feature_id: feature_id.clone(),
              category: category.clone(),
              value: parse_value(&text),
              availability,
              source: SourceRef {
                document_id: document_id.to_owned(),
                page:        table.page,
                priority:    batch.source_type.precedence(),
              },
              extraction_confidence: self.confidence,
              value_display: if text.is_empty() { "-".to_owned() } else { text },
            });
          }
        }
      }
    }

    out.facts = dedup.into_facts();
    tracing::info!(
      tables = out.tables_seen,
      skipped = out.tables_skipped,
      facts = out.facts.len(),
      "flattened tables"
    );
    out
  }

  fn category_for(&self, feature_id: &str, hint: Option<&str>) -> String {
    if let Some(category) = self.ontology.category_of(feature_id) {
      return category.to_owned();
    }
    match hint {
      Some(h) if is_extension(feature_id) => slugify(h),
      _ => UNCATEGORIZED.to_owned(),
    }
  }
}

/// `Best Effort` → `best_effort`.
fn slugify(s: &str) -> String {
  s.split(|c: char| !c.is_alphanumeric())
    .filter(|w| !w.is_empty())
    .map(str::to_lowercase)
    .collect::<Vec<_>>()
    .join("_")
}

/// First-wins deduplication on (variant id, feature id), except that a
/// populated value replaces an earlier negative marker.
#[derive(Default)]
struct Dedup {
  facts: Vec<NewFact>,
  index: HashMap<(String, String), usize>,
}

impl Dedup {
  fn offer(&mut self, fact: NewFact) {
    let key = (fact.variant_id.clone(), fact.feature_id.clone());
    match self.index.get(&key) {
      None => {
        self.index.insert(key, self.facts.len());
        self.facts.push(fact);
      }
      Some(&i) => {
        if !self.facts[i].availability.is_populated() && fact.availability.is_populated() {
          self.facts[i] = fact;
        }
      }
    }
  }

  fn into_facts(self) -> Vec<NewFact> { self.facts }
}
