//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, values are tagged JSON, enums use their
//! snake_case names, and UUIDs are hyphenated lowercase strings.

use std::str::FromStr as _;

use chrono::{DateTime, Utc};
use spherical_core::{
  fact::{Availability, Fact, SourceRef, SpecValue},
  variant::VariantAxes,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_availability(s: &str) -> Result<Availability> {
  Availability::from_str(s).map_err(|_| Error::Decode {
    column: "availability",
    value:  s.to_owned(),
  })
}

pub fn encode_value(v: &SpecValue) -> Result<String> { Ok(serde_json::to_string(v)?) }

pub fn decode_value(s: &str) -> Result<SpecValue> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list shared by every `SELECT` that decodes into [`RawFact`].
pub const FACT_COLUMNS: &str = "fact_id, variant_id, oem_id, campaign_id, model_code, \
   model_year, region, trim, engine_code, transmission, fuel_type, drive_type, \
   feature_id, category, value_json, value_display, availability, \
   source_document, source_page, source_priority, extraction_confidence, recorded_at";

/// Raw values read directly from a `facts` row.
pub struct RawFact {
  pub fact_id:               String,
  pub variant_id:            String,
  pub oem_id:                String,
  pub campaign_id:           String,
  pub model_code:            String,
  pub model_year:            i32,
  pub region:                String,
  pub trim:                  String,
  pub engine_code:           String,
  pub transmission:          String,
  pub fuel_type:             String,
  pub drive_type:            String,
  pub feature_id:            String,
  pub category:              String,
  pub value_json:            String,
  pub value_display:         String,
  pub availability:          String,
  pub source_document:       String,
  pub source_page:           u32,
  pub source_priority:       u32,
  pub extraction_confidence: f64,
  pub recorded_at:           String,
}

impl RawFact {
  /// Read a row selected with [`FACT_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      fact_id:               row.get(0)?,
      variant_id:            row.get(1)?,
      oem_id:                row.get(2)?,
      campaign_id:           row.get(3)?,
      model_code:            row.get(4)?,
      model_year:            row.get(5)?,
      region:                row.get(6)?,
      trim:                  row.get(7)?,
      engine_code:           row.get(8)?,
      transmission:          row.get(9)?,
      fuel_type:             row.get(10)?,
      drive_type:            row.get(11)?,
      feature_id:            row.get(12)?,
      category:              row.get(13)?,
      value_json:            row.get(14)?,
      value_display:         row.get(15)?,
      availability:          row.get(16)?,
      source_document:       row.get(17)?,
      source_page:           row.get(18)?,
      source_priority:       row.get(19)?,
      extraction_confidence: row.get(20)?,
      recorded_at:           row.get(21)?,
    })
  }

  pub fn into_fact(self) -> Result<Fact> {
    Ok(Fact {
      fact_id:               decode_uuid(&self.fact_id)?,
      variant_id:            self.variant_id,
      campaign_id:           self.campaign_id,
      axes:                  VariantAxes {
        oem_id:       self.oem_id,
        model_code:   self.model_code,
        model_year:   self.model_year,
        region:       self.region,
        trim:         self.trim,
        engine_code:  self.engine_code,
        transmission: self.transmission,
        fuel_type:    self.fuel_type,
      },
      drive_type:            self.drive_type,
      feature_id:            self.feature_id,
      category:              self.category,
      value:                 decode_value(&self.value_json)?,
      availability:          decode_availability(&self.availability)?,
      source:                SourceRef {
        document_id: self.source_document,
        page:        self.source_page,
        priority:    self.source_priority,
      },
      extraction_confidence: self.extraction_confidence,
      value_display:         self.value_display,
      recorded_at:           decode_dt(&self.recorded_at)?,
    })
  }
}

/// A [`spherical_core::fact::NewFact`] with every column pre-encoded, ready
/// to be moved into a connection closure.
pub struct EncodedFact {
  pub fact_id:               String,
  pub variant_id:            String,
  pub oem_id:                String,
  pub campaign_id:           String,
  pub model_code:            String,
  pub model_year:            i32,
  pub region:                String,
  pub trim:                  String,
  pub engine_code:           String,
  pub transmission:          String,
  pub fuel_type:             String,
  pub drive_type:            String,
  pub feature_id:            String,
  pub category:              String,
  pub value_json:            String,
  pub value_display:         String,
  pub availability:          &'static str,
  pub source_document:       String,
  pub source_page:           u32,
  pub source_priority:       u32,
  pub extraction_confidence: f64,
  pub recorded_at:           String,
}

impl EncodedFact {
  pub fn encode(fact: spherical_core::fact::NewFact, recorded_at: DateTime<Utc>) -> Result<Self> {
    let expected = fact.axes.variant_id();
    if fact.variant_id != expected {
      return Err(Error::VariantMismatch {
        feature_id: fact.feature_id,
        expected,
        found: fact.variant_id,
      });
    }

    Ok(Self {
      fact_id:               encode_uuid(Uuid::new_v4()),
      value_json:            encode_value(&fact.value)?,
      availability:          fact.availability.into(),
      variant_id:            fact.variant_id,
      oem_id:                fact.axes.oem_id,
      campaign_id:           fact.campaign_id,
      model_code:            fact.axes.model_code,
      model_year:            fact.axes.model_year,
      region:                fact.axes.region,
      trim:                  fact.axes.trim,
      engine_code:           fact.axes.engine_code,
      transmission:          fact.axes.transmission,
      fuel_type:             fact.axes.fuel_type,
      drive_type:            fact.drive_type,
      feature_id:            fact.feature_id,
      category:              fact.category,
      value_display:         fact.value_display,
      source_document:       fact.source.document_id,
      source_page:           fact.source.page,
      source_priority:       fact.source.priority,
      extraction_confidence: fact.extraction_confidence.clamp(0.0, 1.0),
      recorded_at:           encode_dt(recorded_at),
    })
  }
}
