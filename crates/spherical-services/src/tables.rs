//! Client for an HTTP table-extraction service.
//!
//! The service receives the PDF as multipart (`file`, `pages`) and answers
//! `{"tables": [{"columns": [...], "rows": [[...]], "page": 3}]}`.

use std::time::Duration;

use reqwest::{
  Client,
  multipart::{Form, Part},
};
use serde::Deserialize;
use spherical_core::{
  ServiceError,
  services::{PageSelection, ParsedTable, ServiceFuture, SourceDocument, TableParser},
};

use crate::{
  Result,
  http::{build_client, check_status, require_url, transport},
};

#[derive(Clone)]
pub struct HttpTableParser {
  client: Client,
  url:    String,
}

impl HttpTableParser {
  pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
    let url = url.into();
    require_url("table parser url", &url)?;
    Ok(Self { client: build_client(timeout)?, url })
  }

  async fn extract(&self, document: &SourceDocument) -> Result<Vec<ParsedTable>, ServiceError> {
    let file = Part::bytes(document.bytes.to_vec())
      .file_name(document.document_id.clone())
      .mime_str("application/pdf")
      .map_err(transport)?;
    let form = Form::new()
      .part("file", file)
      .text("pages", pages_param(&document.pages));

    let resp = self
      .client
      .post(&self.url)
      .multipart(form)
      .send()
      .await
      .map_err(transport)?;
    let body: TablesResponse = check_status(resp)
      .await?
      .json()
      .await
      .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;

    tracing::debug!(
      url = %self.url,
      document = %document.document_id,
      tables = body.tables.len(),
      "table service responded"
    );
    Ok(body.tables)
  }
}

impl TableParser for HttpTableParser {
  fn parse<'a>(&'a self, document: &'a SourceDocument) -> ServiceFuture<'a, Vec<ParsedTable>> {
    Box::pin(self.extract(document))
  }
}

#[derive(Deserialize)]
struct TablesResponse {
  #[serde(default)]
  tables: Vec<ParsedTable>,
}

/// `all` or a comma-separated list of 1-based pages.
pub fn pages_param(pages: &PageSelection) -> String {
  match pages {
    PageSelection::All => "all".to_owned(),
    PageSelection::Pages(pages) => pages
      .iter()
      .map(u32::to_string)
      .collect::<Vec<_>>()
      .join(","),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn page_selection_param() {
    assert_eq!(pages_param(&PageSelection::All), "all");
    assert_eq!(pages_param(&PageSelection::Pages(vec![2, 5, 6])), "2,5,6");
  }

  #[test]
  fn decodes_table_payloads() {
    let body: TablesResponse = serde_json::from_str(
      r#"{"tables":[
        {"columns":["0","1","2"],"rows":[["Feature","LXi","VXi"],["Airbags","Dual","Dual"]],"page":4},
        {"rows":[["ABS","-","Std"]],"page":5}
      ]}"#,
    )
    .unwrap();
    assert_eq!(body.tables.len(), 2);
    assert_eq!(body.tables[0].page, 4);
    assert!(body.tables[1].columns.is_empty());

    let empty: TablesResponse = serde_json::from_str("{}").unwrap();
    assert!(empty.tables.is_empty());
  }

  #[test]
  fn rejects_non_http_urls() {
    assert!(HttpTableParser::new("file:///tmp/parser", Duration::from_secs(1)).is_err());
    assert!(HttpTableParser::new("http://tables:9000/extract", Duration::from_secs(1)).is_ok());
  }
}
