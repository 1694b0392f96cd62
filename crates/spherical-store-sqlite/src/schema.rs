//! SQL schema for the Spherical SQLite store and cache.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Fact store DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per (structural axes, campaign, feature). Rows change only through
-- the placeholder upgrade in upsert and the campaign flush.
CREATE TABLE IF NOT EXISTS facts (
    fact_id               TEXT PRIMARY KEY,
    variant_id            TEXT NOT NULL,
    oem_id                TEXT NOT NULL,
    campaign_id           TEXT NOT NULL,
    model_code            TEXT NOT NULL,
    model_year            INTEGER NOT NULL,
    region                TEXT NOT NULL,
    trim                  TEXT NOT NULL,
    engine_code           TEXT NOT NULL,
    transmission          TEXT NOT NULL,
    fuel_type             TEXT NOT NULL,
    drive_type            TEXT NOT NULL,
    feature_id            TEXT NOT NULL,
    category              TEXT NOT NULL,
    value_json            TEXT NOT NULL,   -- tagged SpecValue
    value_display         TEXT NOT NULL,
    availability          TEXT NOT NULL,   -- standard | optional | not_available | not_mentioned
    source_document       TEXT NOT NULL,
    source_page           INTEGER NOT NULL,
    source_priority       INTEGER NOT NULL,
    extraction_confidence REAL NOT NULL CHECK (extraction_confidence BETWEEN 0.0 AND 1.0),
    recorded_at           TEXT NOT NULL,   -- RFC 3339 UTC; server-assigned
    UNIQUE (
      oem_id, campaign_id, model_code, model_year, region,
      trim, engine_code, transmission, fuel_type, feature_id
    )
);

CREATE INDEX IF NOT EXISTS facts_variant_feature_idx ON facts(variant_id, feature_id);
CREATE INDEX IF NOT EXISTS facts_campaign_idx        ON facts(oem_id, campaign_id);
CREATE INDEX IF NOT EXISTS facts_model_idx           ON facts(oem_id, model_code, model_year, region);

PRAGMA user_version = 1;
";

/// Spec cache DDL.
pub const CACHE_SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS spec_cache (
    key        TEXT PRIMARY KEY,
    payload    TEXT NOT NULL,      -- JSON CachedSpec
    expires_at INTEGER NOT NULL    -- unix epoch milliseconds
);

CREATE INDEX IF NOT EXISTS spec_cache_expiry_idx ON spec_cache(expires_at);
";
