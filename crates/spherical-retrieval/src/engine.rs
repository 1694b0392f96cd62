//! [`RetrievalEngine`] — config inference, cache-aside lookup, and answer
//! rendering.

use std::{sync::Arc, time::Duration};

use spherical_core::{
  cache::{CachedSpec, DEFAULT_CACHE_TTL, SpecCache, cache_key},
  fact::Fact,
  ontology::Ontology,
  resolver::FeatureResolver,
  store::{Axis, FactFilter, FactStore},
  variant::VariantAxes,
};

use crate::{
  Error, Result,
  query::{
    Answer, AnswerOrigin, Confidence, ConfigurationMetadata, CrossSellSuggestion,
    MetadataRequest, QueryRequest, SourceCitation, SpecDetails,
  },
};

/// Reason attached to cross-sell suggestions whose upgrade path carries no
/// reason tags.
const DEFAULT_UPGRADE_REASON: &str = "upgrade";

pub struct RetrievalEngine<S, C> {
  store:    Arc<S>,
  cache:    Arc<C>,
  ontology: Arc<Ontology>,
  resolver: Arc<FeatureResolver>,
  ttl:      Duration,
}

impl<S: FactStore, C: SpecCache> RetrievalEngine<S, C> {
  pub fn new(
    store: Arc<S>,
    cache: Arc<C>,
    ontology: Arc<Ontology>,
    resolver: Arc<FeatureResolver>,
  ) -> Self {
    Self { store, cache, ontology, resolver, ttl: DEFAULT_CACHE_TTL }
  }

  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  // ── Query ───────────────────────────────────────────────────────────────

  /// Answer one feature question for one (possibly partially specified)
  /// variant.
  pub async fn query(&self, request: &QueryRequest) -> Result<Answer> {
    if request.feature.trim().is_empty() {
      return Err(Error::InvalidQuery("feature must not be empty".into()));
    }
    let axes = self.resolve_axes(request).await?;
    let variant_id = axes.variant_id();

    let resolution = self.resolver.resolve(&request.feature, None).await;
    let feature_id = resolution.feature_id;
    tracing::debug!(
      term = %request.feature,
      feature = %feature_id,
      stage = ?resolution.stage,
      variant = %variant_id,
      "resolved query"
    );

    let key = cache_key(&variant_id, &feature_id);
    if let Some(cached) = self.cache_get(&key).await {
      tracing::debug!(%key, "cache hit");
      return Ok(self.answer(request, &feature_id, variant_id, axes, cached, AnswerOrigin::Cache));
    }

    let fact = self
      .lookup(request, &variant_id, &feature_id)
      .await?
      .ok_or_else(|| Error::FeatureNotFound {
        feature_id: feature_id.clone(),
        variant_id: variant_id.clone(),
      })?;

    let cached = CachedSpec::from(&fact);
    self.cache_set(key, cached.clone()).await;
    Ok(self.answer(request, &feature_id, variant_id, axes, cached, AnswerOrigin::Store))
  }

  /// Fill missing trim/powertrain axes from the first stored fact of the
  /// same model, year and region.
  async fn resolve_axes(&self, request: &QueryRequest) -> Result<VariantAxes> {
    let required = [
      ("oem_id", &request.oem_id),
      ("campaign_id", &request.campaign_id),
      ("model_code", &request.model_code),
      ("region", &request.region),
    ];
    for (name, value) in required {
      if value.trim().is_empty() {
        return Err(Error::InvalidQuery(format!("{name} must not be empty")));
      }
    }

    let given = |axis: &Option<String>| {
      axis
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
    };
    let mut trim = given(&request.trim);
    let mut engine_code = given(&request.engine_code);
    let mut transmission = given(&request.transmission);
    let mut fuel_type = given(&request.fuel_type);

    if trim.is_none() || engine_code.is_none() || transmission.is_none() || fuel_type.is_none() {
      let filter = FactFilter {
        oem_id: Some(request.oem_id.clone()),
        campaign_id: Some(request.campaign_id.clone()),
        model_code: Some(request.model_code.clone()),
        model_year: Some(request.model_year),
        region: Some(request.region.clone()),
        limit: Some(1),
        ..Default::default()
      };
      let baseline = self
        .store
        .query_facts(&filter)
        .await
        .map_err(Error::store)?
        .into_iter()
        .next()
        .ok_or_else(|| {
          Error::ConfigurationUnresolved(format!(
            "no stored configuration for {} {} {} in {} to infer missing axes from",
            request.oem_id, request.model_code, request.model_year, request.region
          ))
        })?;
      tracing::debug!(variant = %baseline.variant_id, "inferring missing axes from baseline");

      let base = baseline.axes;
      trim.get_or_insert(base.trim);
      engine_code.get_or_insert(base.engine_code);
      transmission.get_or_insert(base.transmission);
      fuel_type.get_or_insert(base.fuel_type);
    }

    match (trim, engine_code, transmission, fuel_type) {
      (Some(trim), Some(engine_code), Some(transmission), Some(fuel_type)) => Ok(VariantAxes {
        oem_id: request.oem_id.clone(),
        model_code: request.model_code.clone(),
        model_year: request.model_year,
        region: request.region.clone(),
        trim,
        engine_code,
        transmission,
        fuel_type,
      }),
      _ => Err(Error::ConfigurationUnresolved(
        "structural axes could not be resolved".into(),
      )),
    }
  }

  /// Durable lookup under the canonical id, then under every storage alias.
  async fn lookup(
    &self,
    request: &QueryRequest,
    variant_id: &str,
    feature_id: &str,
  ) -> Result<Option<Fact>> {
    let mut filter = FactFilter {
      oem_id: Some(request.oem_id.clone()),
      campaign_id: Some(request.campaign_id.clone()),
      variant_id: Some(variant_id.to_owned()),
      feature_ids: vec![feature_id.to_owned()],
      limit: Some(1),
      ..Default::default()
    };
    if let Some(fact) = self.first(&filter).await? {
      return Ok(Some(fact));
    }

    let aliases = self.ontology.storage_aliases(feature_id);
    if aliases.len() <= 1 {
      return Ok(None);
    }
    tracing::debug!(feature = feature_id, aliases = aliases.len(), "retrying under synonyms");
    filter.feature_ids = aliases;
    self.first(&filter).await
  }

  async fn first(&self, filter: &FactFilter) -> Result<Option<Fact>> {
    Ok(
      self
        .store
        .query_facts(filter)
        .await
        .map_err(Error::store)?
        .into_iter()
        .next(),
    )
  }

  async fn cache_get(&self, key: &str) -> Option<CachedSpec> {
    match self.cache.get(key).await {
      Ok(hit) => hit,
      Err(e) => {
        tracing::warn!(error = %e, key, "cache read failed; falling through to store");
        None
      }
    }
  }

  async fn cache_set(&self, key: String, payload: CachedSpec) {
    if let Err(e) = self.cache.set(key, payload, self.ttl).await {
      tracing::warn!(error = %e, "cache write failed");
    }
  }

  // ── Invalidation ────────────────────────────────────────────────────────

  /// Drop cached answers for variants whose facts were just rewritten.
  /// Failures are logged and leave entries to expire with their TTL.
  pub async fn invalidate_variants(&self, variant_ids: &[String]) {
    for variant_id in variant_ids {
      match self.cache.invalidate_variant(variant_id).await {
        Ok(0) => {}
        Ok(removed) => tracing::debug!(variant = %variant_id, removed, "invalidated cached specs"),
        Err(e) => tracing::warn!(error = %e, variant = %variant_id, "cache invalidation failed"),
      }
    }
  }

  fn answer(
    &self,
    request: &QueryRequest,
    feature_id: &str,
    variant_id: String,
    axes: VariantAxes,
    spec: CachedSpec,
    origin: AnswerOrigin,
  ) -> Answer {
    let synonym_match = spec.feature_id != feature_id;
    Answer {
      answer: self
        .ontology
        .render_answer(feature_id, &spec.value, spec.availability),
      citation: format!(
        "According to page {} of the {}",
        spec.source_page, spec.source_document
      ),
      confidence: Confidence::label(spec.extraction_confidence, synonym_match),
      source: SourceCitation {
        document:              spec.source_document,
        page:                  spec.source_page,
        extraction_confidence: spec.extraction_confidence,
      },
      spec_details: SpecDetails {
        feature: spec.feature_id,
        availability: spec.availability,
        value: spec.value,
        value_display: spec.value_display,
        variant_id,
        axes,
      },
      cross_sell_suggestions: self.cross_sell(&request.oem_id, &request.model_code),
      origin,
    }
  }

  fn cross_sell(&self, oem_id: &str, model_code: &str) -> Vec<CrossSellSuggestion> {
    let Some(path) = self.ontology.upgrade_path(oem_id, model_code) else {
      return Vec::new();
    };
    let reason = path
      .reason_tags
      .first()
      .map_or(DEFAULT_UPGRADE_REASON, String::as_str);
    path
      .next_tier
      .iter()
      .map(|model| CrossSellSuggestion {
        model:  model.clone(),
        reason: reason.to_owned(),
      })
      .collect()
  }

  // ── Metadata ────────────────────────────────────────────────────────────

  /// Distinct trims, engines, transmissions and fuels for a model.
  pub async fn metadata(&self, request: &MetadataRequest) -> Result<ConfigurationMetadata> {
    let filter = FactFilter {
      oem_id: Some(request.oem_id.clone()),
      campaign_id: Some(request.campaign_id.clone()),
      model_code: Some(request.model_code.clone()),
      ..Default::default()
    };
    let (trims, engines, transmissions, fuel_types) = tokio::try_join!(
      self.store.distinct_values(&filter, Axis::Trim),
      self.store.distinct_values(&filter, Axis::EngineCode),
      self.store.distinct_values(&filter, Axis::Transmission),
      self.store.distinct_values(&filter, Axis::FuelType),
    )
    .map_err(Error::store)?;

    Ok(ConfigurationMetadata { trims, engines, transmissions, fuel_types })
  }
}
