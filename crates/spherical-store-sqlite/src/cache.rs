//! [`SqliteCache`] — a TTL key-value cache implementing [`SpecCache`].

use std::{path::Path, time::Duration};

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use spherical_core::cache::{CachedSpec, SpecCache, variant_key_prefix};

use crate::{Error, Result, schema::CACHE_SCHEMA};

/// Cached spec payloads keyed by `spec:{variant}:{feature}`, each with an
/// absolute expiry. Expired rows read as misses until purged.
#[derive(Clone)]
pub struct SqliteCache {
  conn: tokio_rusqlite::Connection,
}

impl SqliteCache {
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let cache = Self { conn };
    cache.init_schema().await?;
    Ok(cache)
  }

  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let cache = Self { conn };
    cache.init_schema().await?;
    Ok(cache)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(CACHE_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Delete every expired entry, returning how many were removed.
  pub async fn purge_expired(&self) -> Result<usize> {
    let now = now_millis();
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM spec_cache WHERE expires_at <= ?1",
          rusqlite::params![now],
        )?)
      })
      .await?;
    if removed > 0 {
      tracing::debug!(removed, "purged expired cache entries");
    }
    Ok(removed)
  }
}

fn now_millis() -> i64 { Utc::now().timestamp_millis() }

fn expiry_millis(ttl: Duration) -> i64 {
  let ttl = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
  now_millis().saturating_add(ttl)
}

impl SpecCache for SqliteCache {
  type Error = Error;

  async fn get(&self, key: &str) -> Result<Option<CachedSpec>> {
    let key = key.to_owned();
    let now = now_millis();

    let payload: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT payload FROM spec_cache WHERE key = ?1 AND expires_at > ?2",
              rusqlite::params![key, now],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    payload
      .map(|p| serde_json::from_str(&p).map_err(Error::from))
      .transpose()
  }

  async fn set(&self, key: String, payload: CachedSpec, ttl: Duration) -> Result<()> {
    let payload = serde_json::to_string(&payload)?;
    let expires_at = expiry_millis(ttl);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO spec_cache (key, payload, expires_at) VALUES (?1, ?2, ?3)
           ON CONFLICT (key) DO UPDATE SET
             payload    = excluded.payload,
             expires_at = excluded.expires_at",
          rusqlite::params![key, payload, expires_at],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn invalidate_variant(&self, variant_id: &str) -> Result<usize> {
    let prefix = variant_key_prefix(variant_id);
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(conn.execute(
            "DELETE FROM spec_cache WHERE substr(key, 1, length(?1)) = ?1",
            rusqlite::params![prefix],
          )?)
        })
        .await?,
    )
  }
}
