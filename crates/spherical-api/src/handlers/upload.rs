//! `POST /retrieval/upload` — multipart brochure ingestion.
//!
//! | Field | Notes |
//! |-------|-------|
//! | `file` | The brochure; must be a `.pdf` |
//! | `oem_id`, `campaign_id`, `model_code`, `model_year`, `region` | Required |
//! | `configs` | JSON array of `{engine_code, transmission, fuel_type}` |
//! | `engine_code`, `transmission`, `fuel_type` | Single configuration, when `configs` is absent |
//! | `doc_type` | `spec_sheet`, `brochure` (default) or `marketing` |
//! | `drive_type` | Default `FWD` |
//! | `pages` | `all` (default) or `2,3,7` |
//! | `replace` | `true` flushes the campaign first |

use std::str::FromStr as _;

use axum::{
  Json,
  extract::{Multipart, State},
};
use bytes::Bytes;
use spherical_core::{
  cache::SpecCache,
  fact::{DEFAULT_DRIVE_TYPE, SourceType},
  services::{PageSelection, SourceDocument},
  store::FactStore,
  variant::PowertrainConfig,
};
use spherical_ingest::{BatchSpec, IngestReport, IngestRequest};

use crate::{AppState, error::ApiError};

/// The multipart fields, collected before validation.
#[derive(Debug, Default)]
pub struct UploadForm {
  pub file_name:    Option<String>,
  pub file:         Option<Bytes>,
  pub oem_id:       Option<String>,
  pub campaign_id:  Option<String>,
  pub model_code:   Option<String>,
  pub model_year:   Option<String>,
  pub region:       Option<String>,
  pub configs:      Option<String>,
  pub engine_code:  Option<String>,
  pub transmission: Option<String>,
  pub fuel_type:    Option<String>,
  pub doc_type:     Option<String>,
  pub drive_type:   Option<String>,
  pub pages:        Option<String>,
  pub replace:      Option<String>,
}

impl UploadForm {
  /// Record a text field. Unknown fields are ignored.
  pub fn set(&mut self, name: &str, value: String) {
    let slot = match name {
      "oem_id" => &mut self.oem_id,
      "campaign_id" => &mut self.campaign_id,
      "model_code" => &mut self.model_code,
      "model_year" => &mut self.model_year,
      "region" => &mut self.region,
      "configs" => &mut self.configs,
      "engine_code" => &mut self.engine_code,
      "transmission" => &mut self.transmission,
      "fuel_type" => &mut self.fuel_type,
      "doc_type" => &mut self.doc_type,
      "drive_type" => &mut self.drive_type,
      "pages" => &mut self.pages,
      "replace" => &mut self.replace,
      _ => {
        tracing::debug!(field = name, "ignoring unknown upload field");
        return;
      }
    };
    *slot = Some(value);
  }

  pub fn into_request(self) -> Result<IngestRequest, ApiError> {
    let file_name = self
      .file_name
      .filter(|n| !n.trim().is_empty())
      .ok_or_else(|| bad("a `file` part with a file name is required"))?;
    if !file_name.to_lowercase().ends_with(".pdf") {
      return Err(bad("only .pdf uploads are accepted"));
    }
    let bytes = self
      .file
      .filter(|b| !b.is_empty())
      .ok_or_else(|| bad("the uploaded file is empty"))?;

    let model_year = required("model_year", self.model_year)?;
    let model_year = model_year
      .trim()
      .parse::<i32>()
      .map_err(|_| bad(format!("model_year {model_year:?} is not a year")))?;

    let configs = match self.configs.filter(|c| !c.trim().is_empty()) {
      Some(raw) => serde_json::from_str::<Vec<PowertrainConfig>>(&raw)
        .map_err(|e| bad(format!("configs is not a JSON array of configurations: {e}")))?,
      None => vec![PowertrainConfig::new(
        required("engine_code", self.engine_code)?,
        required("transmission", self.transmission)?,
        required("fuel_type", self.fuel_type)?,
      )],
    };

    let source_type = match self.doc_type.filter(|d| !d.trim().is_empty()) {
      Some(raw) => SourceType::from_str(raw.trim())
        .map_err(|_| bad(format!("unknown doc_type {raw:?}")))?,
      None => SourceType::default(),
    };

    let replace = match self.replace.as_deref().map(str::trim) {
      None | Some("") | Some("false") | Some("0") => false,
      Some("true") | Some("1") => true,
      Some(other) => return Err(bad(format!("replace must be true or false, got {other:?}"))),
    };

    let batch = BatchSpec {
      oem_id: required("oem_id", self.oem_id)?,
      campaign_id: required("campaign_id", self.campaign_id)?,
      model_code: required("model_code", self.model_code)?,
      model_year,
      region: required("region", self.region)?,
      drive_type: self
        .drive_type
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DRIVE_TYPE.to_owned()),
      source_type,
      configs,
    };

    Ok(IngestRequest {
      document: SourceDocument {
        document_id: file_name,
        bytes,
        pages: parse_pages(self.pages.as_deref())?,
      },
      batch,
      replace,
    })
  }
}

fn bad(message: impl Into<String>) -> ApiError { ApiError::BadRequest(message.into()) }

fn required(name: &str, value: Option<String>) -> Result<String, ApiError> {
  value
    .map(|v| v.trim().to_owned())
    .filter(|v| !v.is_empty())
    .ok_or_else(|| bad(format!("{name} is required")))
}

/// `all`, blank, or a comma-separated list of 1-based pages.
fn parse_pages(raw: Option<&str>) -> Result<PageSelection, ApiError> {
  let raw = raw.map(str::trim).unwrap_or("");
  if raw.is_empty() || raw.eq_ignore_ascii_case("all") {
    return Ok(PageSelection::All);
  }
  let pages = raw
    .split(',')
    .map(|p| {
      p.trim()
        .parse::<u32>()
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| bad(format!("invalid page {p:?}")))
    })
    .collect::<Result<Vec<_>, _>>()?;
  Ok(PageSelection::Pages(pages))
}

/// `POST /retrieval/upload`
pub async fn handler<S, C>(
  State(state): State<AppState<S, C>>,
  mut multipart: Multipart,
) -> Result<Json<IngestReport>, ApiError>
where
  S: FactStore + 'static,
  C: SpecCache + 'static,
{
  let mut form = UploadForm::default();
  while let Some(field) = multipart.next_field().await.map_err(|e| bad(e.to_string()))? {
    let name = field.name().unwrap_or_default().to_owned();
    if name == "file" {
      form.file_name = field.file_name().map(str::to_owned);
      form.file = Some(field.bytes().await.map_err(|e| bad(e.to_string()))?);
    } else {
      let value = field.text().await.map_err(|e| bad(e.to_string()))?;
      form.set(&name, value);
    }
  }

  let request = form.into_request()?;
  tracing::info!(
    document = %request.document.document_id,
    bytes = request.document.bytes.len(),
    oem = %request.batch.oem_id,
    campaign = %request.batch.campaign_id,
    "upload received"
  );
  let report = state.ingestor.ingest(request).await?;
  state.engine.invalidate_variants(&report.variants_touched).await;
  Ok(Json(report))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn form() -> UploadForm {
    let mut form = UploadForm {
      file_name: Some("WagonR.PDF".into()),
      file: Some(Bytes::from_static(b"%PDF-1.7")),
      ..Default::default()
    };
    for (k, v) in [
      ("oem_id", "maruti_suzuki"),
      ("campaign_id", "launch"),
      ("model_code", "wagonr"),
      ("model_year", "2024"),
      ("region", "IN"),
      ("engine_code", "K10C"),
      ("transmission", "MT"),
      ("fuel_type", "petrol"),
    ] {
      form.set(k, v.to_owned());
    }
    form
  }

  #[test]
  fn single_configuration_fields() {
    let req = form().into_request().unwrap();
    assert_eq!(req.batch.configs, vec![PowertrainConfig::new("K10C", "MT", "petrol")]);
    assert_eq!(req.batch.source_type, SourceType::Brochure);
    assert_eq!(req.batch.drive_type, "FWD");
    assert_eq!(req.document.pages, PageSelection::All);
    assert!(!req.replace);
  }

  #[test]
  fn configs_json_overrides_single_fields() {
    let mut f = form();
    f.set(
      "configs",
      r#"[{"engine_code":"K10C","transmission":"AMT","fuel_type":"petrol"},
          {"engine_code":"K10C","transmission":"MT","fuel_type":"CNG"}]"#
        .into(),
    );
    f.set("doc_type", "spec_sheet".into());
    f.set("pages", "2, 3".into());
    f.set("replace", "true".into());

    let req = f.into_request().unwrap();
    assert_eq!(req.batch.configs.len(), 2);
    assert_eq!(req.batch.source_type, SourceType::SpecSheet);
    assert_eq!(req.document.pages, PageSelection::Pages(vec![2, 3]));
    assert!(req.replace);
  }

  #[test]
  fn rejects_bad_uploads() {
    let mut f = form();
    f.file_name = Some("wagonr.docx".into());
    assert!(matches!(f.into_request(), Err(ApiError::BadRequest(_))));

    let mut f = form();
    f.model_year = Some("next year".into());
    assert!(matches!(f.into_request(), Err(ApiError::BadRequest(_))));

    let mut f = form();
    f.fuel_type = None;
    assert!(matches!(f.into_request(), Err(ApiError::BadRequest(_))));

    let mut f = form();
    f.set("pages", "0".into());
    assert!(matches!(f.into_request(), Err(ApiError::BadRequest(_))));

    let mut f = form();
    f.set("doc_type", "leaflet".into());
    assert!(matches!(f.into_request(), Err(ApiError::BadRequest(_))));
  }
}
