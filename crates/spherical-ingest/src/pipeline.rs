//! [`Ingestor`] — one upload in, facts persisted and the campaign completed.

use std::{
  collections::{BTreeSet, HashMap},
  sync::Arc,
};

use serde::{Deserialize, Serialize};
use spherical_core::{
  fact::NewFact,
  ontology::Ontology,
  services::{ParsedTable, SourceDocument, TableParser},
  store::{CampaignKey, FactFilter, FactStore, UpsertSummary},
};
use tokio::sync::Mutex;

use crate::{
  Error, Result,
  completeness::completion_stubs,
  flatten::{BatchSpec, TableFlattener},
};

/// One brochure upload.
#[derive(Debug, Clone)]
pub struct IngestRequest {
  pub document: SourceDocument,
  pub batch:    BatchSpec,
  /// Flush the campaign's existing facts in the same transaction.
  pub replace:  bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
  pub document_id:      String,
  pub tables_seen:      usize,
  pub tables_skipped:   usize,
  pub facts_extracted:  usize,
  pub write:            UpsertSummary,
  pub stubs_written:    usize,
  /// Variants whose stored facts were written or flushed, sorted.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub variants_touched: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub warnings:         Vec<String>,
}

impl IngestReport {
  /// Facts ingested from the document (excluding stubs).
  pub fn facts_written(&self) -> usize { self.write.written() }
}

pub struct Ingestor<S> {
  store:     Arc<S>,
  ontology:  Arc<Ontology>,
  parser:    Arc<dyn TableParser>,
  flattener: TableFlattener,
  campaigns: Mutex<HashMap<CampaignKey, Arc<Mutex<()>>>>,
}

impl<S: FactStore> Ingestor<S> {
  pub fn new(
    store: Arc<S>,
    ontology: Arc<Ontology>,
    parser: Arc<dyn TableParser>,
    flattener: TableFlattener,
  ) -> Self {
    Self {
      store,
      ontology,
      parser,
      flattener,
      campaigns: Mutex::new(HashMap::new()),
    }
  }

  /// Parse the document, then flatten, persist, and complete the campaign.
  ///
  /// Zero usable tables is not an error: the report carries a warning and
  /// nothing is written or flushed.
  pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReport> {
    validate(&request.batch)?;

    let tables = match self.parser.parse(&request.document).await {
      Ok(tables) => tables,
      Err(e) => {
        tracing::warn!(error = %e, document = %request.document.document_id, "table parsing failed");
        Vec::new()
      }
    };
    self
      .ingest_tables(&request.document.document_id, &request.batch, request.replace, tables)
      .await
  }

  /// Everything after table parsing.
  pub async fn ingest_tables(
    &self,
    document_id: &str,
    batch: &BatchSpec,
    replace: bool,
    tables: Vec<ParsedTable>,
  ) -> Result<IngestReport> {
    validate(batch)?;

    let mut report = IngestReport {
      document_id: document_id.to_owned(),
      ..Default::default()
    };

    if tables.is_empty() {
      tracing::warn!(document = document_id, "no usable tables; nothing ingested");
      report.warnings.push("no usable tables found in document".to_owned());
      return Ok(report);
    }

    let flattened = self.flattener.flatten(document_id, &tables, batch).await;
    report.tables_seen = flattened.tables_seen;
    report.tables_skipped = flattened.tables_skipped;
    report.facts_extracted = flattened.facts.len();

    if flattened.facts.is_empty() {
      tracing::warn!(document = document_id, "tables yielded no facts; nothing ingested");
      report.warnings.push("tables yielded no facts".to_owned());
      return Ok(report);
    }

    let campaign = CampaignKey::new(&batch.oem_id, &batch.campaign_id);
    let lock = self.campaign_lock(&campaign).await;
    let written = {
      let _guard = lock.lock().await;
      self.write_campaign(&campaign, replace, flattened.facts).await
    };
    self.release_campaign_lock(&campaign, lock).await;
    let (summary, stubs_written, variants_touched) = written?;

    report.write = summary;
    report.stubs_written = stubs_written;
    report.variants_touched = variants_touched;

    tracing::info!(
      document = document_id,
      oem = %campaign.oem_id,
      campaign = %campaign.campaign_id,
      written = report.write.written(),
      flushed = report.write.flushed,
      stubs = report.stubs_written,
      variants = report.variants_touched.len(),
      "ingestion complete"
    );
    Ok(report)
  }

  /// Persist extracted facts together with the campaign's completion stubs.
  /// Must run under the campaign lock.
  async fn write_campaign(
    &self,
    campaign: &CampaignKey,
    replace: bool,
    mut facts: Vec<NewFact>,
  ) -> Result<(UpsertSummary, usize, Vec<String>)> {
    let filter = FactFilter {
      oem_id: Some(campaign.oem_id.clone()),
      campaign_id: Some(campaign.campaign_id.clone()),
      ..Default::default()
    };
    let existing = self.store.query_facts(&filter).await.map_err(store_error)?;

    // The stubs ride in the same transaction as the extracted facts, so the
    // campaign is never visible half complete.
    let stubs = if replace {
      completion_stubs(&[], &facts, &self.ontology)
    } else {
      completion_stubs(&existing, &facts, &self.ontology)
    };
    let stub_count = stubs.len();

    let mut touched: BTreeSet<String> = facts.iter().map(|f| f.variant_id.clone()).collect();
    if replace {
      touched.extend(existing.into_iter().map(|f| f.variant_id));
    }

    facts.extend(stubs);
    let mut summary = if replace {
      self.store.replace_campaign(campaign.clone(), facts).await
    } else {
      self.store.upsert_facts(facts).await
    }
    .map_err(store_error)?;

    // Stub keys are new by construction and the campaign lock keeps them so.
    summary.inserted = summary.inserted.saturating_sub(stub_count);
    Ok((summary, stub_count, touched.into_iter().collect()))
  }

  async fn campaign_lock(&self, campaign: &CampaignKey) -> Arc<Mutex<()>> {
    self
      .campaigns
      .lock()
      .await
      .entry(campaign.clone())
      .or_default()
      .clone()
  }

  /// Forget the campaign's lock once no other ingestion holds or awaits it.
  async fn release_campaign_lock(&self, campaign: &CampaignKey, lock: Arc<Mutex<()>>) {
    let mut campaigns = self.campaigns.lock().await;
    // One reference is ours and one is the map's.
    if Arc::strong_count(&lock) == 2 {
      campaigns.remove(campaign);
    }
  }

  #[cfg(test)]
  pub(crate) async fn tracked_campaigns(&self) -> usize { self.campaigns.lock().await.len() }
}

fn store_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> Error {
  Error::Store(Box::new(e))
}

fn validate(batch: &BatchSpec) -> Result<()> {
  let required = [
    ("oem_id", &batch.oem_id),
    ("campaign_id", &batch.campaign_id),
    ("model_code", &batch.model_code),
    ("region", &batch.region),
  ];
  for (name, value) in required {
    if value.trim().is_empty() {
      return Err(Error::InvalidRequest(format!("{name} must not be empty")));
    }
  }
  if batch.configs.is_empty() {
    return Err(Error::InvalidRequest(
      "at least one powertrain configuration is required".to_owned(),
    ));
  }
  for config in &batch.configs {
    if config.engine_code.trim().is_empty()
      || config.transmission.trim().is_empty()
      || config.fuel_type.trim().is_empty()
    {
      return Err(Error::InvalidRequest(format!(
        "powertrain configuration {config:?} has an empty axis"
      )));
    }
  }
  Ok(())
}
