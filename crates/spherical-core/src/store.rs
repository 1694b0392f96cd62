//! The `FactStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g.
//! `spherical-store-sqlite`). Ingestion and retrieval depend on this
//! abstraction, not on any concrete engine.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::fact::{Fact, NewFact};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Scope of a re-ingestion flush.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CampaignKey {
  pub oem_id:      String,
  pub campaign_id: String,
}

impl CampaignKey {
  pub fn new(oem_id: impl Into<String>, campaign_id: impl Into<String>) -> Self {
    Self { oem_id: oem_id.into(), campaign_id: campaign_id.into() }
  }
}

/// Conjunctive filter for [`FactStore::query_facts`] and
/// [`FactStore::distinct_values`]. Unset fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct FactFilter {
  pub oem_id:      Option<String>,
  pub campaign_id: Option<String>,
  pub model_code:  Option<String>,
  pub model_year:  Option<i32>,
  pub region:      Option<String>,
  pub variant_id:  Option<String>,
  /// Matches any of these feature ids (`IN`); empty means any feature.
  pub feature_ids: Vec<String>,
  pub limit:       Option<usize>,
}

impl FactFilter {
  pub fn campaign(campaign_id: impl Into<String>) -> Self {
    Self { campaign_id: Some(campaign_id.into()), ..Default::default() }
  }
}

/// A structural axis that can be listed with [`FactStore::distinct_values`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
  Trim,
  EngineCode,
  Transmission,
  FuelType,
  DriveType,
  Region,
}

/// Outcome of a bulk write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertSummary {
  /// Rows that did not exist before.
  pub inserted:  usize,
  /// Existing negative/absent rows replaced by a populated value.
  pub upgraded:  usize,
  /// Rows left as they were because the key already existed.
  pub unchanged: usize,
  /// Rows removed by a campaign flush.
  pub flushed:   usize,
}

impl UpsertSummary {
  pub fn written(&self) -> usize { self.inserted + self.upgraded }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over durable fact storage.
///
/// At most one fact exists per (structural axes, campaign, feature id). Every
/// bulk write is atomic: on error nothing from the batch is visible.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait FactStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Insert a batch in one transaction.
  ///
  /// A key that already exists keeps its row, except that a populated
  /// incoming fact (`standard`/`optional`) replaces an existing
  /// `not_available`/`not_mentioned` row.
  fn upsert_facts(
    &self,
    facts: Vec<NewFact>,
  ) -> impl Future<Output = Result<UpsertSummary, Self::Error>> + Send + '_;

  /// Delete every fact of `campaign`, then insert `facts`, in one
  /// transaction.
  fn replace_campaign(
    &self,
    campaign: CampaignKey,
    facts: Vec<NewFact>,
  ) -> impl Future<Output = Result<UpsertSummary, Self::Error>> + Send + '_;

  /// Facts matching `filter`, best source first (lowest priority rank), then
  /// oldest first.
  fn query_facts<'a>(
    &'a self,
    filter: &'a FactFilter,
  ) -> impl Future<Output = Result<Vec<Fact>, Self::Error>> + Send + 'a;

  /// Sorted distinct non-empty values of `axis` among facts matching
  /// `filter`.
  fn distinct_values<'a>(
    &'a self,
    filter: &'a FactFilter,
    axis: Axis,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + 'a;
}
