//! Vision-model table extraction, used when the primary parser finds nothing
//! usable.
//!
//! The document is attached inline to a chat request once per page; the model
//! answers with a JSON array of rows whose first row is the header
//! `Feature, Best Effort Category, <trim>...`.

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde_json::Value;
use spherical_core::{
  ServiceError,
  services::{
    PageSelection, ParsedTable, ServiceFuture, SourceDocument, TableParser, strip_code_fence,
  },
};

use crate::llm::{ContentPart, FileData, LlmClient, MessageContent};

const VISION_PROMPT: &str = "\
Extract the vehicle specification table from the given page of the attached document. \
Return a JSON array of arrays representing the table.
1. If several trims share one column header (e.g. 'Trim A, Trim B'), split them into separate columns.
2. The FIRST array MUST be the header: ['Feature', 'Best Effort Category', <each trim as its own column>].
3. For 'Best Effort Category', give a 1-2 word category inferred from the feature name (e.g. 'Safety', 'Exterior', 'Infotainment').
4. Values that applied to a grouped column are duplicated for every trim in that group.
5. If a feature names a trim (e.g. 'Kerb Weight Trim A'), put its value only under that trim, use '-' elsewhere, and drop the trim from the feature name.
6. Keep multi-value cells exactly as printed, including slashes, newlines, units and parenthesised notes such as '(Petrol)' or '(CNG)'.
7. Write checkmarks as 'Standard' and crosses or hyphens as '-'.
Return only the raw JSON array, without markdown.";

#[derive(Clone)]
pub struct VisionTableParser {
  llm: LlmClient,
}

impl VisionTableParser {
  pub fn new(llm: LlmClient) -> Self { Self { llm } }

  async fn extract(&self, document: &SourceDocument) -> Result<Vec<ParsedTable>, ServiceError> {
    let data_url = format!("data:application/pdf;base64,{}", B64.encode(&document.bytes));
    let pages = match &document.pages {
      // An unpaged request reads the first page.
      PageSelection::All => vec![1],
      PageSelection::Pages(pages) => pages.clone(),
    };

    let mut tables = Vec::new();
    let mut last_error = None;
    for page in pages {
      let prompt = format!("{VISION_PROMPT}\nRead page {page} only.");
      let content = MessageContent::Parts(vec![
        ContentPart::Text { text: &prompt },
        ContentPart::File {
          file: FileData { filename: &document.document_id, file_data: data_url.clone() },
        },
      ]);

      let result = self
        .llm
        .chat(self.llm.vision_model(), content)
        .await
        .and_then(|raw| table_from_grid(&raw, page));
      match result {
        Ok(Some(table)) => {
          tracing::info!(page, rows = table.rows.len(), "vision model extracted a table");
          tables.push(table);
        }
        Ok(None) => tracing::warn!(page, "vision model returned no table"),
        Err(e) => {
          tracing::warn!(page, error = %e, "vision extraction failed");
          last_error = Some(e);
        }
      }
    }

    match last_error {
      Some(e) if tables.is_empty() => Err(e),
      _ => Ok(tables),
    }
  }
}

impl TableParser for VisionTableParser {
  fn parse<'a>(&'a self, document: &'a SourceDocument) -> ServiceFuture<'a, Vec<ParsedTable>> {
    Box::pin(self.extract(document))
  }
}

/// Interpret a model response as a header row plus body rows. A grid with no
/// body rows is `None`.
pub fn table_from_grid(raw: &str, page: u32) -> Result<Option<ParsedTable>, ServiceError> {
  let grid: Vec<Vec<Value>> = serde_json::from_str(strip_code_fence(raw))
    .map_err(|e| ServiceError::InvalidResponse(format!("vision grid: {e}")))?;

  let mut rows = grid
    .into_iter()
    .map(|row| row.into_iter().map(cell_text).collect::<Vec<_>>());
  let Some(header) = rows.next() else {
    return Ok(None);
  };
  let body: Vec<Vec<String>> = rows.collect();
  if body.is_empty() {
    return Ok(None);
  }
  Ok(Some(ParsedTable::new(header, body, page)))
}

fn cell_text(value: Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => s,
    other => other.to_string(),
  }
}
