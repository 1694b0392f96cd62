//! Engine tests against the in-memory SQLite store and cache.

use std::{sync::Arc, time::Duration};

use spherical_core::{
  cache::{CachedSpec, SpecCache},
  fact::{Availability, NewFact, SourceRef, SpecValue},
  ontology::Ontology,
  resolver::FeatureResolver,
  store::{CampaignKey, FactFilter, FactStore},
  variant::VariantAxes,
};
use spherical_store_sqlite::{SqliteCache, SqliteStore};

use crate::{
  Answer, AnswerOrigin, Confidence, Error, MetadataRequest, QueryRequest, RetrievalEngine,
};

const DEF: &str = r#"
version = 1

[features.fuel_efficiency]
category = "performance"
synonyms = ["mileage"]
template = "The certified mileage is {value} {unit}."

[features.power_windows]
category = "comfort_convenience"
synonyms = ["Electric Windows"]
template = "Power windows are {value}."

[features.seating_capacity]
category = "dimensions"
template = "It seats {value}."

[upgrade_paths.maruti_suzuki.wagonr]
next_tier = ["ciaz", "brezza"]
reason_tags = ["more_power", "premium_features"]
"#;

type Engine<C = SqliteCache> = RetrievalEngine<SqliteStore, C>;

async fn engine_with<C: SpecCache>(cache: C) -> (Engine<C>, Arc<SqliteStore>) {
  let ontology = Arc::new(Ontology::from_toml(DEF).unwrap());
  let resolver = Arc::new(FeatureResolver::new(ontology.clone()));
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let engine = RetrievalEngine::new(store.clone(), Arc::new(cache), ontology, resolver);
  (engine, store)
}

async fn engine() -> (Engine, Arc<SqliteStore>) {
  engine_with(SqliteCache::open_in_memory().await.unwrap()).await
}

fn axes(trim: &str, fuel: &str) -> VariantAxes {
  VariantAxes {
    oem_id:       "maruti_suzuki".into(),
    model_code:   "wagonr".into(),
    model_year:   2024,
    region:       "IN".into(),
    trim:         trim.into(),
    engine_code:  "K10C".into(),
    transmission: "MT".into(),
    fuel_type:    fuel.into(),
  }
}

fn fact(axes: VariantAxes, feature: &str, value: SpecValue, availability: Availability) -> NewFact {
  NewFact {
    variant_id: axes.variant_id(),
    campaign_id: "launch".into(),
    axes,
    drive_type: "FWD".into(),
    feature_id: feature.into(),
    category: "performance".into(),
    value_display: value.render().unwrap_or_default(),
    value,
    availability,
    source: SourceRef { document_id: "wagonr.pdf".into(), page: 4, priority: 2 },
    extraction_confidence: 0.8,
  }
}

fn mileage(trim: &str, fuel: &str) -> NewFact {
  fact(
    axes(trim, fuel),
    "fuel_efficiency",
    SpecValue::Numeric { value: 24.35, unit: Some("km/l".into()) },
    Availability::Standard,
  )
}

fn query(feature: &str) -> QueryRequest {
  QueryRequest {
    oem_id:       "maruti_suzuki".into(),
    campaign_id:  "launch".into(),
    model_code:   "wagonr".into(),
    model_year:   2024,
    region:       "IN".into(),
    trim:         Some("VXi".into()),
    engine_code:  Some("K10C".into()),
    transmission: Some("MT".into()),
    fuel_type:    Some("petrol".into()),
    feature:      feature.into(),
  }
}

// ─── Cache-aside ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn second_query_is_served_from_cache() {
  let (engine, store) = engine().await;
  store.upsert_facts(vec![mileage("VXi", "petrol")]).await.unwrap();

  let first = engine.query(&query("Mileage")).await.unwrap();
  assert_eq!(first.origin, AnswerOrigin::Store);
  assert_eq!(first.answer, "The certified mileage is 24.35 km/l.");
  assert_eq!(first.citation, "According to page 4 of the wagonr.pdf");
  assert_eq!(first.confidence, Confidence::Medium);
  assert_eq!(first.spec_details.feature, "fuel_efficiency");
  assert_eq!(first.spec_details.variant_id, axes("VXi", "petrol").variant_id());

  let second = engine.query(&query("mileage")).await.unwrap();
  assert_eq!(second.origin, AnswerOrigin::Cache);
  assert_eq!(Answer { origin: AnswerOrigin::Store, ..second }, first);
}

#[tokio::test]
async fn expired_cache_entries_fall_back_to_the_store() {
  let (engine, store) = engine().await;
  let engine = engine.with_ttl(Duration::ZERO);
  store.upsert_facts(vec![mileage("VXi", "petrol")]).await.unwrap();

  engine.query(&query("mileage")).await.unwrap();
  let again = engine.query(&query("mileage")).await.unwrap();
  assert_eq!(again.origin, AnswerOrigin::Store);
}

#[tokio::test]
async fn invalidated_variants_are_reread_from_the_store() {
  let (engine, store) = engine().await;
  store.upsert_facts(vec![mileage("VXi", "petrol")]).await.unwrap();
  engine.query(&query("mileage")).await.unwrap();

  let mut revised = mileage("VXi", "petrol");
  revised.value = SpecValue::Numeric { value: 25.19, unit: Some("km/l".into()) };
  revised.value_display = "25.19 km/l".into();
  let campaign = CampaignKey::new("maruti_suzuki", "launch");
  store.replace_campaign(campaign, vec![revised]).await.unwrap();

  let stale = engine.query(&query("mileage")).await.unwrap();
  assert_eq!(stale.origin, AnswerOrigin::Cache);

  engine
    .invalidate_variants(&[axes("VXi", "petrol").variant_id()])
    .await;
  let fresh = engine.query(&query("mileage")).await.unwrap();
  assert_eq!(fresh.origin, AnswerOrigin::Store);
  assert_eq!(fresh.answer, "The certified mileage is 25.19 km/l.");
}

/// A cache whose every call fails.
struct BrokenCache;

#[derive(Debug, thiserror::Error)]
#[error("cache offline")]
struct Offline;

impl SpecCache for BrokenCache {
  type Error = Offline;

  async fn get(&self, _: &str) -> Result<Option<CachedSpec>, Offline> { Err(Offline) }

  async fn set(&self, _: String, _: CachedSpec, _: Duration) -> Result<(), Offline> {
    Err(Offline)
  }

  async fn invalidate_variant(&self, _: &str) -> Result<usize, Offline> { Err(Offline) }
}

#[tokio::test]
async fn cache_failures_degrade_to_store_reads() {
  let (engine, store) = engine_with(BrokenCache).await;
  store.upsert_facts(vec![mileage("VXi", "petrol")]).await.unwrap();

  for _ in 0..2 {
    let answer = engine.query(&query("mileage")).await.unwrap();
    assert_eq!(answer.origin, AnswerOrigin::Store);
    assert_eq!(answer.source.page, 4);
  }
}

// ─── Lookup ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn synonym_keyed_rows_are_found_with_low_confidence() {
  let (engine, store) = engine().await;
  let legacy = fact(
    axes("VXi", "petrol"),
    "electric windows",
    SpecValue::text("Front & Rear"),
    Availability::Standard,
  );
  store.upsert_facts(vec![legacy]).await.unwrap();

  let answer = engine.query(&query("Power Windows")).await.unwrap();
  assert_eq!(answer.confidence, Confidence::Low);
  assert_eq!(answer.spec_details.feature, "electric windows");
  assert_eq!(answer.answer, "Power windows are Front & Rear.");

  // The cached copy keeps the synonym provenance.
  let cached = engine.query(&query("power windows")).await.unwrap();
  assert_eq!(cached.origin, AnswerOrigin::Cache);
  assert_eq!(cached.confidence, Confidence::Low);
}

#[tokio::test]
async fn high_confidence_and_absence_sentences() {
  let (engine, store) = engine().await;
  let mut stub = fact(
    axes("VXi", "petrol"),
    "seating_capacity",
    SpecValue::Empty,
    Availability::NotMentioned,
  );
  stub.extraction_confidence = 1.0;
  stub.source = SourceRef::synthetic();
  store.upsert_facts(vec![stub]).await.unwrap();

  let answer = engine.query(&query("seating capacity")).await.unwrap();
  assert_eq!(answer.confidence, Confidence::High);
  assert_eq!(answer.answer, "Seating capacity is not mentioned in the brochure.");
  assert_eq!(answer.source.page, 0);
}

#[tokio::test]
async fn missing_feature_is_not_found() {
  let (engine, store) = engine().await;
  store.upsert_facts(vec![mileage("VXi", "petrol")]).await.unwrap();

  let err = engine.query(&query("seating capacity")).await.unwrap_err();
  assert!(matches!(err, Error::FeatureNotFound { ref feature_id, .. } if feature_id == "seating_capacity"));

  // Unknown terms resolve to an extension id, which is simply absent.
  let err = engine.query(&query("heated seats")).await.unwrap_err();
  assert!(matches!(err, Error::FeatureNotFound { ref feature_id, .. } if feature_id == "ext_unreviewed_heated_seats"));
}

// ─── Configuration inference ─────────────────────────────────────────────────

#[tokio::test]
async fn missing_axes_are_inferred_from_a_baseline() {
  let (engine, store) = engine().await;
  store.upsert_facts(vec![mileage("VXi", "petrol")]).await.unwrap();

  let mut partial = query("mileage");
  partial.trim = None;
  partial.engine_code = Some(String::new());
  partial.transmission = None;
  partial.fuel_type = None;

  let answer = engine.query(&partial).await.unwrap();
  assert_eq!(answer.spec_details.axes, axes("VXi", "petrol"));
}

#[tokio::test]
async fn given_axes_are_kept_over_the_baseline() {
  let (engine, store) = engine().await;
  store
    .upsert_facts(vec![mileage("VXi", "petrol"), mileage("VXi", "CNG")])
    .await
    .unwrap();

  let mut partial = query("mileage");
  partial.engine_code = None;
  partial.fuel_type = Some("CNG".into());

  let answer = engine.query(&partial).await.unwrap();
  assert_eq!(answer.spec_details.axes.fuel_type, "CNG");
  assert_eq!(answer.spec_details.axes.engine_code, "K10C");
}

#[tokio::test]
async fn unresolvable_configuration_is_a_client_error() {
  let (engine, _) = engine().await;
  let mut partial = query("mileage");
  partial.trim = None;

  let err = engine.query(&partial).await.unwrap_err();
  assert!(matches!(err, Error::ConfigurationUnresolved(_)));

  let mut blank = query("mileage");
  blank.region = " ".into();
  assert!(matches!(engine.query(&blank).await.unwrap_err(), Error::InvalidQuery(_)));
}

// ─── Cross-sell and metadata ─────────────────────────────────────────────────

#[tokio::test]
async fn cross_sell_follows_the_upgrade_path() {
  let (engine, store) = engine().await;
  let mut other = mileage("VXi", "petrol");
  other.axes.model_code = "ciaz".into();
  other.variant_id = other.axes.variant_id();
  store
    .upsert_facts(vec![mileage("VXi", "petrol"), other])
    .await
    .unwrap();

  let answer = engine.query(&query("mileage")).await.unwrap();
  let models: Vec<_> = answer
    .cross_sell_suggestions
    .iter()
    .map(|s| (s.model.as_str(), s.reason.as_str()))
    .collect();
  assert_eq!(models, vec![("ciaz", "more_power"), ("brezza", "more_power")]);

  let mut ciaz = query("mileage");
  ciaz.model_code = "ciaz".into();
  let answer = engine.query(&ciaz).await.unwrap();
  assert!(answer.cross_sell_suggestions.is_empty());
}

#[tokio::test]
async fn metadata_lists_distinct_axes() {
  let (engine, store) = engine().await;
  store
    .upsert_facts(vec![
      mileage("VXi", "petrol"),
      mileage("VXi", "CNG"),
      mileage("LXi", "petrol"),
    ])
    .await
    .unwrap();

  let meta = engine
    .metadata(&MetadataRequest {
      oem_id:      "maruti_suzuki".into(),
      campaign_id: "launch".into(),
      model_code:  "wagonr".into(),
    })
    .await
    .unwrap();
  assert_eq!(meta.trims, vec!["LXi", "VXi"]);
  assert_eq!(meta.engines, vec!["K10C"]);
  assert_eq!(meta.transmissions, vec!["MT"]);
  assert_eq!(meta.fuel_types, vec!["CNG", "petrol"]);

  // Unrelated campaigns see nothing.
  let none = engine
    .metadata(&MetadataRequest {
      oem_id:      "maruti_suzuki".into(),
      campaign_id: "festive".into(),
      model_code:  "wagonr".into(),
    })
    .await
    .unwrap();
  assert!(none.trims.is_empty());
  assert!(store.query_facts(&FactFilter::campaign("festive")).await.unwrap().is_empty());
}
