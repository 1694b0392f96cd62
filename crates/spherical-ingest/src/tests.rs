//! End-to-end ingestion tests against an in-memory `SqliteStore`.

use std::sync::Arc;

use bytes::Bytes;
use spherical_core::{
  fact::{
    Availability, NewFact, SYNTHETIC_SOURCE_DOCUMENT, SYNTHETIC_SOURCE_PRIORITY, SourceRef,
    SourceType, SpecValue,
  },
  ontology::Ontology,
  resolver::FeatureResolver,
  services::{PageSelection, ParsedTable, ServiceFuture, SourceDocument, TableParser},
  store::{Axis, CampaignKey, FactFilter, FactStore, UpsertSummary},
  variant::{PowertrainConfig, VariantAxes},
};
use spherical_store_sqlite::SqliteStore;

use crate::{
  BatchSpec, Error, IngestRequest, Ingestor, TableFlattener, VariantUnifier,
  completeness::enforce_completeness,
};

/// Six canonical features.
const CORE: &str = r#"
version = 1

[features.airbags]
category = "safety"
template = "{value} airbags."

[features.abs_with_ebd]
category = "safety"
synonyms = ["abs"]
template = "ABS with EBD is {value}."

[features.power_windows]
category = "comfort_convenience"
synonyms = ["electric windows"]
template = "Power windows are {value}."

[features.air_conditioner]
category = "comfort_convenience"
template = "Air conditioning is {value}."

[features.fuel_efficiency]
category = "performance"
synonyms = ["mileage"]
template = "The certified mileage is {value} {unit}."

[features.seating_capacity]
category = "dimensions"
template = "It seats {value}."
"#;

fn ontology() -> Arc<Ontology> { Arc::new(Ontology::from_toml(CORE).unwrap()) }

async fn store() -> Arc<SqliteStore> {
  Arc::new(SqliteStore::open_in_memory().await.expect("in-memory store"))
}

fn row(cells: &[&str]) -> Vec<String> { cells.iter().map(|c| c.to_string()).collect() }

/// Returns the same tables for every document.
struct Fixed(Vec<ParsedTable>);

impl TableParser for Fixed {
  fn parse<'a>(&'a self, _: &'a SourceDocument) -> ServiceFuture<'a, Vec<ParsedTable>> {
    let tables = self.0.clone();
    Box::pin(async move { Ok(tables) })
  }
}

fn ingestor(store: Arc<SqliteStore>, tables: Vec<ParsedTable>) -> Ingestor<SqliteStore> {
  let ontology = ontology();
  let resolver = Arc::new(FeatureResolver::new(ontology.clone()));
  let flattener = TableFlattener::new(ontology.clone(), resolver, VariantUnifier::identity());
  Ingestor::new(store, ontology, Arc::new(Fixed(tables)), flattener)
}

fn batch() -> BatchSpec {
  BatchSpec {
    oem_id:      "maruti_suzuki".into(),
    campaign_id: "launch".into(),
    model_code:  "wagonr".into(),
    model_year:  2024,
    region:      "IN".into(),
    drive_type:  "FWD".into(),
    source_type: SourceType::Brochure,
    configs:     vec![PowertrainConfig::new("K10C", "MT", "petrol")],
  }
}

fn request(batch: BatchSpec, replace: bool) -> IngestRequest {
  IngestRequest {
    document: SourceDocument {
      document_id: "wagonr.pdf".into(),
      bytes:       Bytes::from_static(b"%PDF-1.7"),
      pages:       PageSelection::All,
    },
    batch,
    replace,
  }
}

fn axes(trim: &str) -> VariantAxes {
  VariantAxes {
    oem_id:       "maruti_suzuki".into(),
    model_code:   "wagonr".into(),
    model_year:   2024,
    region:       "IN".into(),
    trim:         trim.into(),
    engine_code:  "K10C".into(),
    transmission: "MT".into(),
    fuel_type:    "petrol".into(),
  }
}

async fn fact_for(store: &SqliteStore, trim: &str, feature: &str) -> Option<spherical_core::fact::Fact> {
  let filter = FactFilter {
    campaign_id: Some("launch".into()),
    variant_id: Some(axes(trim).variant_id()),
    feature_ids: vec![feature.into()],
    ..Default::default()
  };
  store.query_facts(&filter).await.unwrap().into_iter().next()
}

// ─── Completeness ────────────────────────────────────────────────────────────

fn extracted(trim: &str, feature: &str) -> NewFact {
  let axes = axes(trim);
  NewFact {
    variant_id: axes.variant_id(),
    campaign_id: "launch".into(),
    axes,
    drive_type: "FWD".into(),
    feature_id: feature.into(),
    category: "safety".into(),
    value: SpecValue::text("Standard"),
    availability: Availability::Standard,
    source: SourceRef { document_id: "wagonr.pdf".into(), page: 2, priority: 2 },
    extraction_confidence: 0.8,
    value_display: "Standard".into(),
  }
}

#[tokio::test]
async fn completeness_backfills_each_variant_exactly() {
  let s = store().await;
  let o = ontology();
  let mut facts: Vec<NewFact> = ["airbags", "abs_with_ebd", "power_windows", "air_conditioner", "fuel_efficiency"]
    .iter()
    .map(|f| extracted("VXi", f))
    .collect();
  // LXi exists only through an unreviewed feature.
  facts.push(extracted("LXi", "ext_unreviewed_heated_seats"));
  s.upsert_facts(facts).await.unwrap();

  let campaign = CampaignKey::new("maruti_suzuki", "launch");
  let written = enforce_completeness(s.as_ref(), &o, &campaign).await.unwrap();
  assert_eq!(written, 1 + 6);

  let stub = fact_for(&s, "VXi", "seating_capacity").await.unwrap();
  assert_eq!(stub.availability, Availability::NotMentioned);
  assert_eq!(stub.value, SpecValue::Empty);
  assert_eq!(stub.source.document_id, SYNTHETIC_SOURCE_DOCUMENT);
  assert_eq!(stub.source.priority, SYNTHETIC_SOURCE_PRIORITY);
  assert_eq!(stub.source.page, 0);
  assert_eq!(stub.extraction_confidence, 1.0);
  assert_eq!(stub.axes, axes("VXi"));
  assert_eq!(stub.category, "dimensions");

  let lxi = FactFilter {
    variant_id: Some(axes("LXi").variant_id()),
    ..FactFilter::campaign("launch")
  };
  let lxi_facts = s.query_facts(&lxi).await.unwrap();
  assert_eq!(lxi_facts.len(), 7);
  assert_eq!(
    lxi_facts
      .iter()
      .filter(|f| f.availability == Availability::NotMentioned)
      .count(),
    6
  );

  // Idempotent.
  assert_eq!(enforce_completeness(s.as_ref(), &o, &campaign).await.unwrap(), 0);
}

// ─── Ingestor ────────────────────────────────────────────────────────────────

fn brochure() -> Vec<ParsedTable> {
  vec![ParsedTable::new(
    row(&["Feature", "LXi", "VXi"]),
    vec![
      row(&["SAFETY", "", ""]),
      row(&["Airbags", "Dual", "Dual"]),
      row(&["Power Windows", "-", "O"]),
      row(&["Mileage", "24.35 km/l", "24.35 km/l"]),
    ],
    3,
  )]
}

#[tokio::test]
async fn ingest_flattens_persists_and_completes() {
  let s = store().await;
  let report = ingestor(s.clone(), brochure())
    .ingest(request(batch(), false))
    .await
    .unwrap();

  assert_eq!(report.tables_seen, 1);
  assert_eq!(report.facts_extracted, 6);
  assert_eq!(report.facts_written(), 6);
  // 3 of 6 features present on each of two variants.
  assert_eq!(report.stubs_written, 6);
  assert!(report.warnings.is_empty());

  let vxi = fact_for(&s, "VXi", "power_windows").await.unwrap();
  assert_eq!(vxi.availability, Availability::Optional);
  let lxi = fact_for(&s, "LXi", "power_windows").await.unwrap();
  assert_eq!(lxi.availability, Availability::NotAvailable);

  let mileage = fact_for(&s, "LXi", "fuel_efficiency").await.unwrap();
  assert_eq!(mileage.value, SpecValue::Numeric { value: 24.35, unit: Some("km/l".into()) });
  assert_eq!(mileage.source.page, 3);
}

#[tokio::test]
async fn later_batch_with_populated_value_wins() {
  let s = store().await;
  ingestor(s.clone(), brochure())
    .ingest(request(batch(), false))
    .await
    .unwrap();

  let update = vec![ParsedTable::new(
    row(&["Feature", "LXi"]),
    vec![row(&["Electric Windows", "Front"]), row(&["Seating Capacity", "5"])],
    9,
  )];
  let report = ingestor(s.clone(), update)
    .ingest(request(batch(), false))
    .await
    .unwrap();
  assert_eq!(report.write.upgraded, 2);
  assert_eq!(report.variants_touched, vec![axes("LXi").variant_id()]);

  let windows = fact_for(&s, "LXi", "power_windows").await.unwrap();
  assert_eq!(windows.availability, Availability::Standard);
  assert_eq!(windows.value_display, "Front");

  // The completeness stub was upgraded in place.
  let seats = fact_for(&s, "LXi", "seating_capacity").await.unwrap();
  assert_eq!(seats.availability, Availability::Standard);
  assert_eq!(seats.source.page, 9);
}

#[tokio::test]
async fn zero_tables_reports_a_warning_and_writes_nothing() {
  let s = store().await;
  let report = ingestor(s.clone(), vec![])
    .ingest(request(batch(), true))
    .await
    .unwrap();

  assert_eq!(report.facts_extracted, 0);
  assert_eq!(report.facts_written(), 0);
  assert_eq!(report.warnings.len(), 1);
  assert!(s.query_facts(&FactFilter::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn replace_flushes_previous_ingestion() {
  let s = store().await;
  ingestor(s.clone(), brochure())
    .ingest(request(batch(), false))
    .await
    .unwrap();

  let renamed = vec![ParsedTable::new(
    row(&["Feature", "ZXi"]),
    vec![row(&["Airbags", "6"])],
    1,
  )];
  let report = ingestor(s.clone(), renamed)
    .ingest(request(batch(), true))
    .await
    .unwrap();
  assert_eq!(report.write.flushed, 12);
  assert_eq!(report.stubs_written, 5);

  // Flushed variants are reported alongside the new one.
  let mut touched: Vec<String> = ["LXi", "VXi", "ZXi"].map(|t| axes(t).variant_id()).into();
  touched.sort();
  assert_eq!(report.variants_touched, touched);

  assert!(fact_for(&s, "VXi", "airbags").await.is_none());
  let trims = s
    .distinct_values(&FactFilter::campaign("launch"), spherical_core::store::Axis::Trim)
    .await
    .unwrap();
  assert_eq!(trims, vec!["ZXi"]);
}

#[tokio::test]
async fn concurrent_replacements_of_one_campaign_serialize() {
  let s = store().await;
  let ingestor = Arc::new(ingestor(s.clone(), brochure()));

  let (a, b) = tokio::join!(
    ingestor.ingest(request(batch(), true)),
    ingestor.ingest(request(batch(), true)),
  );
  a.unwrap();
  b.unwrap();

  // Two variants x six features, no duplicates.
  let all = s.query_facts(&FactFilter::campaign("launch")).await.unwrap();
  assert_eq!(all.len(), 12);
  assert_eq!(ingestor.tracked_campaigns().await, 0);
}

#[tokio::test]
async fn campaign_locks_are_dropped_once_released() {
  let s = store().await;
  let ingestor = ingestor(s.clone(), brochure());

  for campaign in ["launch", "festive", "monsoon"] {
    let mut batch = batch();
    batch.campaign_id = campaign.into();
    ingestor.ingest(request(batch, false)).await.unwrap();
  }
  assert_eq!(ingestor.tracked_campaigns().await, 0);
}

#[tokio::test]
async fn rejects_batches_without_configurations() {
  let s = store().await;
  let mut b = batch();
  b.configs.clear();
  let err = ingestor(s.clone(), brochure()).ingest(request(b, false)).await.unwrap_err();
  assert!(matches!(err, Error::InvalidRequest(_)));

  let mut b = batch();
  b.configs = vec![PowertrainConfig::new("K10C", "", "petrol")];
  let err = ingestor(s, brochure()).ingest(request(b, false)).await.unwrap_err();
  assert!(matches!(err, Error::InvalidRequest(_)));
}

/// Refuses any write that carries a completeness stub.
struct RefusesStubs(Arc<SqliteStore>);

#[derive(Debug, thiserror::Error)]
enum Refusal {
  #[error("stub write refused")]
  Stub,
  #[error(transparent)]
  Store(#[from] spherical_store_sqlite::Error),
}

fn refuse_stubs(facts: &[NewFact]) -> Result<(), Refusal> {
  if facts.iter().any(|f| f.source.document_id == SYNTHETIC_SOURCE_DOCUMENT) {
    return Err(Refusal::Stub);
  }
  Ok(())
}

impl FactStore for RefusesStubs {
  type Error = Refusal;

  async fn upsert_facts(&self, facts: Vec<NewFact>) -> Result<UpsertSummary, Refusal> {
    refuse_stubs(&facts)?;
    Ok(self.0.upsert_facts(facts).await?)
  }

  async fn replace_campaign(
    &self,
    campaign: CampaignKey,
    facts: Vec<NewFact>,
  ) -> Result<UpsertSummary, Refusal> {
    refuse_stubs(&facts)?;
    Ok(self.0.replace_campaign(campaign, facts).await?)
  }

  async fn query_facts(&self, filter: &FactFilter) -> Result<Vec<spherical_core::fact::Fact>, Refusal> {
    Ok(self.0.query_facts(filter).await?)
  }

  async fn distinct_values(&self, filter: &FactFilter, axis: Axis) -> Result<Vec<String>, Refusal> {
    Ok(self.0.distinct_values(filter, axis).await?)
  }
}

#[tokio::test]
async fn failed_completion_leaves_no_extracted_facts_behind() {
  let s = store().await;
  let ontology = ontology();
  let resolver = Arc::new(FeatureResolver::new(ontology.clone()));
  let flattener = TableFlattener::new(ontology.clone(), resolver, VariantUnifier::identity());
  let ingestor = Ingestor::new(
    Arc::new(RefusesStubs(s.clone())),
    ontology,
    Arc::new(Fixed(brochure())),
    flattener,
  );

  let err = ingestor.ingest(request(batch(), false)).await.unwrap_err();
  assert!(matches!(err, Error::Store(_)));
  assert!(s.query_facts(&FactFilter::default()).await.unwrap().is_empty());
  assert_eq!(ingestor.tracked_campaigns().await, 0);
}

#[tokio::test]
async fn stubs_are_counted_apart_from_extracted_facts() {
  let s = store().await;
  let report = ingestor(s.clone(), brochure())
    .ingest(request(batch(), true))
    .await
    .unwrap();
  assert_eq!(report.write.inserted, 6);
  assert_eq!(report.stubs_written, 6);

  let stub = fact_for(&s, "VXi", "seating_capacity").await.unwrap();
  assert_eq!(stub.availability, Availability::NotMentioned);
  assert_eq!(stub.source.priority, SYNTHETIC_SOURCE_PRIORITY);
  assert_eq!(s.query_facts(&FactFilter::campaign("launch")).await.unwrap().len(), 12);
}
