//! The feature-term resolution cascade.
//!
//! A [`FeatureResolver`] owns an ordered list of [`ResolveStrategy`]s and
//! stops at the first one that returns a canonical id. When none does, the
//! term becomes a deterministic unreviewed extension id, so resolution is
//! total: it never fails for any input.

use std::{
  collections::HashMap,
  future::Future,
  pin::Pin,
  sync::Arc,
  time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, Semaphore};

use crate::{
  ontology::{Ontology, extension_id, normalize_term},
  services::Embedder,
};

/// Minimum normalized similarity accepted by [`FuzzyMatch`].
pub const DEFAULT_FUZZY_CUTOFF: f64 = 0.85;

/// Maximum cosine distance accepted by [`SemanticMatch`].
pub const DEFAULT_SEMANTIC_MAX_DISTANCE: f32 = 0.4;

pub type ResolveFuture<'a> = Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;

/// Which stage of the cascade produced an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStage {
  Exact,
  Fuzzy,
  Substring,
  Semantic,
  Extension,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
  pub feature_id: String,
  pub stage:      ResolutionStage,
}

/// One stage of the cascade. Implementations backed by a network service
/// must bound their own latency and report any failure as `None`.
pub trait ResolveStrategy: Send + Sync {
  fn stage(&self) -> ResolutionStage;

  fn try_resolve<'a>(
    &'a self,
    term: &'a str,
    category_hint: Option<&'a str>,
  ) -> ResolveFuture<'a>;
}

// ─── Exact ───────────────────────────────────────────────────────────────────

/// Inverted-index lookup of the normalized term.
pub struct ExactMatch {
  ontology: Arc<Ontology>,
}

impl ExactMatch {
  pub fn new(ontology: Arc<Ontology>) -> Self { Self { ontology } }
}

impl ResolveStrategy for ExactMatch {
  fn stage(&self) -> ResolutionStage { ResolutionStage::Exact }

  fn try_resolve<'a>(&'a self, term: &'a str, _: Option<&'a str>) -> ResolveFuture<'a> {
    let hit = self.ontology.lookup_exact(term).map(str::to_owned);
    Box::pin(async move { hit })
  }
}

// ─── Fuzzy ───────────────────────────────────────────────────────────────────

/// Best normalized-Levenshtein match over the index keys, accepted only at or
/// above the cutoff. Keys are scanned in sorted order and only a strictly
/// better score replaces the current best, so ties resolve deterministically.
pub struct FuzzyMatch {
  ontology: Arc<Ontology>,
  cutoff:   f64,
}

impl FuzzyMatch {
  pub fn new(ontology: Arc<Ontology>) -> Self {
    Self::with_cutoff(ontology, DEFAULT_FUZZY_CUTOFF)
  }

  pub fn with_cutoff(ontology: Arc<Ontology>, cutoff: f64) -> Self { Self { ontology, cutoff } }

  fn best_match(&self, term: &str) -> Option<String> {
    let needle = normalize_term(term);
    if needle.is_empty() {
      return None;
    }

    let mut best: Option<(&str, f64)> = None;
    for key in self.ontology.index_keys() {
      let score = strsim::normalized_levenshtein(&needle, key);
      if best.is_none_or(|(_, s)| score > s) {
        best = Some((key, score));
      }
    }

    let (key, score) = best?;
    if score < self.cutoff {
      return None;
    }
    tracing::debug!(term = %needle, matched = %key, score, "fuzzy feature match");
    self.ontology.index_target(key).map(str::to_owned)
  }
}

impl ResolveStrategy for FuzzyMatch {
  fn stage(&self) -> ResolutionStage { ResolutionStage::Fuzzy }

  fn try_resolve<'a>(&'a self, term: &'a str, _: Option<&'a str>) -> ResolveFuture<'a> {
    let hit = self.best_match(term);
    Box::pin(async move { hit })
  }
}

// ─── Substring ───────────────────────────────────────────────────────────────

/// Shortest index key considered by [`SubstringMatch`].
const MIN_SUBSTRING_KEY_LEN: usize = 3;

/// Longest index key that occurs as a whole-word run inside the term, e.g.
/// `Kerb Weight (kg)` → `kerb weight`. Ties keep the alphabetically first key.
///
/// The key must also carry most of the term: its words, outside any
/// parenthesised qualifier, must outnumber the term's remaining words. A
/// one-word synonym such as `power` therefore never claims `Power Steering`.
pub struct SubstringMatch {
  ontology: Arc<Ontology>,
}

impl SubstringMatch {
  pub fn new(ontology: Arc<Ontology>) -> Self { Self { ontology } }

  fn best_match(&self, term: &str) -> Option<String> {
    let haystack = normalize_term(term);
    let term_words = word_count(&haystack);
    let mut best: Option<&str> = None;
    for key in self.ontology.index_keys() {
      if key.len() < MIN_SUBSTRING_KEY_LEN || key.len() >= haystack.len() {
        continue;
      }
      if word_count(key) * 2 <= term_words {
        continue;
      }
      if contains_word_run(&haystack, key) && best.is_none_or(|b| key.len() > b.len()) {
        best = Some(key);
      }
    }
    let key = best?;
    tracing::debug!(term = %haystack, matched = %key, "substring feature match");
    self.ontology.index_target(key).map(str::to_owned)
  }
}

impl ResolveStrategy for SubstringMatch {
  fn stage(&self) -> ResolutionStage { ResolutionStage::Substring }

  fn try_resolve<'a>(&'a self, term: &'a str, _: Option<&'a str>) -> ResolveFuture<'a> {
    let hit = self.best_match(term);
    Box::pin(async move { hit })
  }
}

/// Alphanumeric words of `text` outside parentheses.
fn word_count(text: &str) -> usize {
  let mut depth = 0usize;
  let mut outside = String::with_capacity(text.len());
  for c in text.chars() {
    match c {
      '(' => depth += 1,
      ')' => depth = depth.saturating_sub(1),
      _ if depth == 0 => outside.push(c),
      _ => outside.push(' '),
    }
  }
  outside
    .split(|c: char| !c.is_alphanumeric())
    .filter(|w| !w.is_empty())
    .count()
}

/// `needle` occurs in `haystack` bounded by non-alphanumerics or the ends.
fn contains_word_run(haystack: &str, needle: &str) -> bool {
  haystack.match_indices(needle).any(|(start, _)| {
    let before = haystack[..start].chars().next_back();
    let after = haystack[start + needle.len()..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
  })
}

// ─── Semantic ────────────────────────────────────────────────────────────────

/// Tuning for [`SemanticMatch`].
#[derive(Debug, Clone)]
pub struct SemanticOptions {
  pub max_distance:    f32,
  /// Per embedding call.
  pub timeout:         Duration,
  /// Concurrent embedding calls allowed.
  pub max_concurrency: usize,
}

impl Default for SemanticOptions {
  fn default() -> Self {
    Self {
      max_distance:    DEFAULT_SEMANTIC_MAX_DISTANCE,
      timeout:         Duration::from_secs(5),
      max_concurrency: 4,
    }
  }
}

/// Nearest canonical feature in embedding space.
///
/// Outcomes are memoised per (term, hint) for the lifetime of the strategy so
/// a term resolves the same way on every call. Failed or timed-out calls are
/// not memoised.
pub struct SemanticMatch {
  embedder: Arc<dyn Embedder>,
  vectors:  Vec<(String, Vec<f32>)>,
  options:  SemanticOptions,
  permits:  Semaphore,
  memo:     RwLock<HashMap<String, Option<String>>>,
}

impl SemanticMatch {
  /// Build the strategy, embedding every ontology entry that does not ship
  /// an embedding. Entries that fail to embed are left out; if none remain
  /// the stage never matches.
  pub async fn prime(
    ontology: &Ontology,
    embedder: Arc<dyn Embedder>,
    options: SemanticOptions,
  ) -> Self {
    let mut vectors = Vec::with_capacity(ontology.len());
    for entry in ontology.features() {
      if let Some(embedding) = &entry.embedding {
        vectors.push((entry.id.clone(), embedding.clone()));
        continue;
      }
      let description = entry.semantic_description();
      match tokio::time::timeout(options.timeout, embedder.embed(&description)).await {
        Ok(Ok(embedding)) => vectors.push((entry.id.clone(), embedding)),
        Ok(Err(e)) => {
          tracing::warn!(feature = %entry.id, error = %e, "failed to embed ontology entry");
        }
        Err(_) => {
          tracing::warn!(feature = %entry.id, "timed out embedding ontology entry");
        }
      }
    }
    tracing::info!(
      embedded = vectors.len(),
      total = ontology.len(),
      "semantic resolver primed"
    );
    Self::from_vectors(embedder, vectors, options)
  }

  /// Build from precomputed `(feature id, embedding)` pairs.
  pub fn from_vectors(
    embedder: Arc<dyn Embedder>,
    vectors: Vec<(String, Vec<f32>)>,
    options: SemanticOptions,
  ) -> Self {
    let permits = Semaphore::new(options.max_concurrency.max(1));
    Self {
      embedder,
      vectors,
      options,
      permits,
      memo: RwLock::new(HashMap::new()),
    }
  }

  pub fn len(&self) -> usize { self.vectors.len() }

  pub fn is_empty(&self) -> bool { self.vectors.is_empty() }

  async fn resolve_uncached(&self, query: &str) -> Result<Option<String>, ()> {
    let _permit = self.permits.acquire().await.map_err(|_| ())?;
    let embedding = match tokio::time::timeout(self.options.timeout, self.embedder.embed(query)).await
    {
      Ok(Ok(v)) => v,
      Ok(Err(e)) => {
        tracing::warn!(error = %e, "semantic stage unavailable, skipping");
        return Err(());
      }
      Err(_) => {
        tracing::warn!("semantic stage timed out, skipping");
        return Err(());
      }
    };

    let mut best: Option<(&str, f32)> = None;
    for (id, vector) in &self.vectors {
      let Some(distance) = cosine_distance(&embedding, vector) else {
        continue;
      };
      if best.is_none_or(|(_, d)| distance < d) {
        best = Some((id, distance));
      }
    }

    Ok(
      best
        .filter(|(_, d)| *d < self.options.max_distance)
        .map(|(id, _)| id.to_owned()),
    )
  }
}

impl ResolveStrategy for SemanticMatch {
  fn stage(&self) -> ResolutionStage { ResolutionStage::Semantic }

  fn try_resolve<'a>(
    &'a self,
    term: &'a str,
    category_hint: Option<&'a str>,
  ) -> ResolveFuture<'a> {
    Box::pin(async move {
      let term = normalize_term(term);
      if term.is_empty() || self.vectors.is_empty() {
        return None;
      }
      let query = match category_hint.map(str::trim).filter(|h| !h.is_empty()) {
        Some(hint) => format!("{term} (category: {hint})"),
        None => term,
      };

      if let Some(hit) = self.memo.read().await.get(&query) {
        return hit.clone();
      }
      let outcome = self.resolve_uncached(&query).await.ok()?;
      self.memo.write().await.insert(query, outcome.clone());
      outcome
    })
  }
}

/// `1 - cos(a, b)`; `None` for mismatched dimensions or zero vectors.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f32> {
  if a.len() != b.len() || a.is_empty() {
    return None;
  }
  let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
  for (x, y) in a.iter().zip(b) {
    dot += x * y;
    na += x * x;
    nb += y * y;
  }
  if na == 0.0 || nb == 0.0 {
    return None;
  }
  Some(1.0 - dot / (na.sqrt() * nb.sqrt()))
}

// ─── Cascade ─────────────────────────────────────────────────────────────────

/// Ordered cascade of strategies with an extension-id fallback.
pub struct FeatureResolver {
  strategies: Vec<Box<dyn ResolveStrategy>>,
}

impl FeatureResolver {
  /// Exact, fuzzy, then substring matching against `ontology`.
  pub fn new(ontology: Arc<Ontology>) -> Self {
    Self {
      strategies: vec![
        Box::new(ExactMatch::new(ontology.clone())),
        Box::new(FuzzyMatch::new(ontology.clone())),
        Box::new(SubstringMatch::new(ontology)),
      ],
    }
  }

  /// A cascade with no strategies; everything becomes an extension.
  pub fn empty() -> Self { Self { strategies: Vec::new() } }

  /// Append a stage after the existing ones.
  pub fn with_strategy(mut self, strategy: impl ResolveStrategy + 'static) -> Self {
    self.strategies.push(Box::new(strategy));
    self
  }

  pub fn stages(&self) -> Vec<ResolutionStage> {
    self.strategies.iter().map(|s| s.stage()).collect()
  }

  pub async fn resolve(&self, raw_term: &str, category_hint: Option<&str>) -> Resolution {
    for strategy in &self.strategies {
      if let Some(feature_id) = strategy.try_resolve(raw_term, category_hint).await {
        tracing::debug!(term = raw_term, %feature_id, stage = ?strategy.stage(), "resolved feature");
        return Resolution { feature_id, stage: strategy.stage() };
      }
    }
    let feature_id = extension_id(raw_term);
    tracing::debug!(term = raw_term, %feature_id, "unresolved term, using extension id");
    Resolution { feature_id, stage: ResolutionStage::Extension }
  }

  /// Canonical id for `raw_term`, or its extension id.
  pub async fn resolve_feature_id(&self, raw_term: &str) -> String {
    self.resolve(raw_term, None).await.feature_id
  }
}
