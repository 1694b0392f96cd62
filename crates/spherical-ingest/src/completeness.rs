//! The Completeness Enforcer: after an ingestion batch, every variant of the
//! campaign gets a fact for every canonical feature, real or an explicit
//! `not_mentioned` stub.

use std::collections::{BTreeMap, BTreeSet};

use spherical_core::{
  fact::{Fact, NewFact},
  ontology::Ontology,
  store::{CampaignKey, FactFilter, FactStore},
};

/// Backfill stubs for `campaign` on its own, returning how many were written.
/// Running it again on a complete campaign writes nothing. Ingestion does not
/// call this; it folds [`completion_stubs`] into its batch instead.
pub async fn enforce_completeness<S: FactStore>(
  store: &S,
  ontology: &Ontology,
  campaign: &CampaignKey,
) -> Result<usize, S::Error> {
  let filter = FactFilter {
    oem_id: Some(campaign.oem_id.clone()),
    campaign_id: Some(campaign.campaign_id.clone()),
    ..Default::default()
  };
  let facts = store.query_facts(&filter).await?;

  let stubs = missing_feature_stubs(&facts, ontology);
  if stubs.is_empty() {
    tracing::debug!(
      oem = %campaign.oem_id,
      campaign = %campaign.campaign_id,
      "campaign already complete"
    );
    return Ok(0);
  }

  let summary = store.upsert_facts(stubs).await?;
  tracing::info!(
    oem = %campaign.oem_id,
    campaign = %campaign.campaign_id,
    stubs = summary.inserted,
    "backfilled not-mentioned features"
  );
  Ok(summary.inserted)
}

/// One stub per (variant, canonical feature) absent from `facts`.
pub fn missing_feature_stubs(facts: &[Fact], ontology: &Ontology) -> Vec<NewFact> {
  completion_stubs(facts, &[], ontology)
}

/// The stubs a campaign needs once `incoming` is written on top of
/// `existing`. Variants seen in either set are completed; no stub shares a
/// key with an incoming or existing fact.
pub fn completion_stubs(existing: &[Fact], incoming: &[NewFact], ontology: &Ontology) -> Vec<NewFact> {
  let mut variants: BTreeMap<&str, (NewFact, BTreeSet<&str>)> = BTreeMap::new();
  for fact in existing {
    variants
      .entry(fact.variant_id.as_str())
      .or_insert_with(|| (NewFact::from(fact), BTreeSet::new()))
      .1
      .insert(fact.feature_id.as_str());
  }
  for fact in incoming {
    variants
      .entry(fact.variant_id.as_str())
      .or_insert_with(|| (fact.clone(), BTreeSet::new()))
      .1
      .insert(fact.feature_id.as_str());
  }

  let mut stubs = Vec::new();
  for (template, present) in variants.values() {
    for entry in ontology.features() {
      if !present.contains(entry.id.as_str()) {
        stubs.push(NewFact::not_mentioned(template, &entry.id, &entry.category));
      }
    }
  }
  stubs
}
