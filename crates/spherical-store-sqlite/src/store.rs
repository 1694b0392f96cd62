//! [`SqliteStore`] — the SQLite implementation of [`FactStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, types::Value};
use spherical_core::{
  fact::{Fact, NewFact},
  store::{Axis, CampaignKey, FactFilter, FactStore, UpsertSummary},
};

use crate::{
  Error, Result,
  encode::{EncodedFact, FACT_COLUMNS, RawFact},
  schema::SCHEMA,
};

/// Insert, or upgrade a negative/absent placeholder to a populated value.
/// Any other conflict leaves the existing row untouched.
const UPSERT_SQL: &str = "
INSERT INTO facts (
  fact_id, variant_id, oem_id, campaign_id, model_code, model_year, region,
  trim, engine_code, transmission, fuel_type, drive_type, feature_id, category,
  value_json, value_display, availability, source_document, source_page,
  source_priority, extraction_confidence, recorded_at
) VALUES (
  ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
  ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22
)
ON CONFLICT (
  oem_id, campaign_id, model_code, model_year, region,
  trim, engine_code, transmission, fuel_type, feature_id
) DO UPDATE SET
  drive_type            = excluded.drive_type,
  category              = excluded.category,
  value_json            = excluded.value_json,
  value_display         = excluded.value_display,
  availability          = excluded.availability,
  source_document       = excluded.source_document,
  source_page           = excluded.source_page,
  source_priority       = excluded.source_priority,
  extraction_confidence = excluded.extraction_confidence,
  recorded_at           = excluded.recorded_at
WHERE facts.availability IN ('not_available', 'not_mentioned')
  AND excluded.availability IN ('standard', 'optional')";

const EXISTS_SQL: &str = "
SELECT 1 FROM facts
WHERE oem_id = ?1 AND campaign_id = ?2 AND model_code = ?3 AND model_year = ?4
  AND region = ?5 AND trim = ?6 AND engine_code = ?7 AND transmission = ?8
  AND fuel_type = ?9 AND feature_id = ?10";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Spherical fact store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Validate and encode a batch before any database work starts, so a bad
  /// fact rejects the whole batch.
  fn encode_batch(facts: Vec<NewFact>) -> Result<Vec<EncodedFact>> {
    let now = Utc::now();
    facts
      .into_iter()
      .map(|fact| EncodedFact::encode(fact, now))
      .collect()
  }

  /// Optionally flush a campaign, then upsert `batch`, in one transaction.
  async fn write_batch(
    &self,
    flush: Option<CampaignKey>,
    batch: Vec<EncodedFact>,
  ) -> Result<UpsertSummary> {
    let summary = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut summary = UpsertSummary::default();

        if let Some(campaign) = flush {
          summary.flushed = tx.execute(
            "DELETE FROM facts WHERE oem_id = ?1 AND campaign_id = ?2",
            rusqlite::params![campaign.oem_id, campaign.campaign_id],
          )?;
        }

        {
          let mut exists = tx.prepare_cached(EXISTS_SQL)?;
          let mut upsert = tx.prepare_cached(UPSERT_SQL)?;

          for f in &batch {
            let existed = exists
              .query_row(
                rusqlite::params![
                  f.oem_id,
                  f.campaign_id,
                  f.model_code,
                  f.model_year,
                  f.region,
                  f.trim,
                  f.engine_code,
                  f.transmission,
                  f.fuel_type,
                  f.feature_id,
                ],
                |_| Ok(()),
              )
              .optional()?
              .is_some();

            let changed = upsert.execute(rusqlite::params![
              f.fact_id,
              f.variant_id,
              f.oem_id,
              f.campaign_id,
              f.model_code,
              f.model_year,
              f.region,
              f.trim,
              f.engine_code,
              f.transmission,
              f.fuel_type,
              f.drive_type,
              f.feature_id,
              f.category,
              f.value_json,
              f.value_display,
              f.availability,
              f.source_document,
              f.source_page,
              f.source_priority,
              f.extraction_confidence,
              f.recorded_at,
            ])?;

            match (existed, changed) {
              (false, _) => summary.inserted += 1,
              (true, 0) => summary.unchanged += 1,
              (true, _) => summary.upgraded += 1,
            }
          }
        }

        tx.commit()?;
        Ok(summary)
      })
      .await?;

    tracing::debug!(
      inserted = summary.inserted,
      upgraded = summary.upgraded,
      unchanged = summary.unchanged,
      flushed = summary.flushed,
      "fact batch committed"
    );
    Ok(summary)
  }
}

// ─── Filters ─────────────────────────────────────────────────────────────────

/// `WHERE` clause (possibly empty) and positional parameters for `filter`.
fn filter_clause(filter: &FactFilter) -> (String, Vec<Value>) {
  let mut conds: Vec<String> = Vec::new();
  let mut params: Vec<Value> = Vec::new();

  let text_eq = [
    ("oem_id", &filter.oem_id),
    ("campaign_id", &filter.campaign_id),
    ("model_code", &filter.model_code),
    ("region", &filter.region),
    ("variant_id", &filter.variant_id),
  ];
  for (column, value) in text_eq {
    if let Some(v) = value {
      params.push(Value::Text(v.clone()));
      conds.push(format!("{column} = ?{}", params.len()));
    }
  }
  if let Some(year) = filter.model_year {
    params.push(Value::Integer(i64::from(year)));
    conds.push(format!("model_year = ?{}", params.len()));
  }
  if !filter.feature_ids.is_empty() {
    let mut slots = Vec::with_capacity(filter.feature_ids.len());
    for id in &filter.feature_ids {
      params.push(Value::Text(id.clone()));
      slots.push(format!("?{}", params.len()));
    }
    conds.push(format!("feature_id IN ({})", slots.join(", ")));
  }

  let clause = if conds.is_empty() {
    String::new()
  } else {
    format!("WHERE {}", conds.join(" AND "))
  };
  (clause, params)
}

fn axis_column(axis: Axis) -> &'static str {
  match axis {
    Axis::Trim => "trim",
    Axis::EngineCode => "engine_code",
    Axis::Transmission => "transmission",
    Axis::FuelType => "fuel_type",
    Axis::DriveType => "drive_type",
    Axis::Region => "region",
  }
}

// ─── FactStore impl ──────────────────────────────────────────────────────────

impl FactStore for SqliteStore {
  type Error = Error;

  async fn upsert_facts(&self, facts: Vec<NewFact>) -> Result<UpsertSummary> {
    let batch = Self::encode_batch(facts)?;
    self.write_batch(None, batch).await
  }

  async fn replace_campaign(
    &self,
    campaign: CampaignKey,
    facts: Vec<NewFact>,
  ) -> Result<UpsertSummary> {
    if let Some(stray) = facts
      .iter()
      .find(|f| f.axes.oem_id != campaign.oem_id || f.campaign_id != campaign.campaign_id)
    {
      return Err(Error::CampaignMismatch {
        feature_id:  stray.feature_id.clone(),
        oem_id:      stray.axes.oem_id.clone(),
        campaign_id: stray.campaign_id.clone(),
      });
    }
    let batch = Self::encode_batch(facts)?;
    self.write_batch(Some(campaign), batch).await
  }

  async fn query_facts(&self, filter: &FactFilter) -> Result<Vec<Fact>> {
    let (clause, params) = filter_clause(filter);
    let limit = filter.limit.map(|n| format!("LIMIT {n}")).unwrap_or_default();
    let sql = format!(
      "SELECT {FACT_COLUMNS} FROM facts {clause}
       ORDER BY source_priority ASC, recorded_at ASC, rowid ASC {limit}"
    );

    let raws: Vec<RawFact> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawFact::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFact::into_fact).collect()
  }

  async fn distinct_values(&self, filter: &FactFilter, axis: Axis) -> Result<Vec<String>> {
    let (clause, params) = filter_clause(filter);
    let column = axis_column(axis);
    let extra = if clause.is_empty() { "WHERE" } else { "AND" };
    let sql = format!(
      "SELECT DISTINCT {column} FROM facts {clause} {extra} {column} <> ''
       ORDER BY {column}"
    );

    let values = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), |row| row.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(values)
  }
}

#[cfg(test)]
mod filter_tests {
  use super::*;

  #[test]
  fn empty_filter_has_no_clause() {
    let (clause, params) = filter_clause(&FactFilter::default());
    assert!(clause.is_empty());
    assert!(params.is_empty());
  }

  #[test]
  fn feature_ids_become_an_in_list() {
    let filter = FactFilter {
      variant_id: Some("v".into()),
      feature_ids: vec!["a".into(), "b".into()],
      ..Default::default()
    };
    let (clause, params) = filter_clause(&filter);
    assert_eq!(clause, "WHERE variant_id = ?1 AND feature_id IN (?2, ?3)");
    assert_eq!(params.len(), 3);
  }
}
