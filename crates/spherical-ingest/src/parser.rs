//! Table-parser fallback chain.

use std::sync::Arc;

use spherical_core::services::{ParsedTable, ServiceFuture, SourceDocument, TableParser};

/// A parse is usable when some table has more than this many non-blank data
/// cells.
pub const MIN_USABLE_DATA_CELLS: usize = 15;

/// Tries each parser in order and returns the first usable result.
///
/// When no stage is usable, the last non-empty result is returned (possibly
/// junk, which the flattener then skips); when every stage fails or comes
/// back empty, the chain yields zero tables. It never returns an error.
pub struct FallbackParser {
  stages:         Vec<(&'static str, Arc<dyn TableParser>)>,
  min_data_cells: usize,
}

impl FallbackParser {
  pub fn new(name: &'static str, primary: Arc<dyn TableParser>) -> Self {
    Self {
      stages:         vec![(name, primary)],
      min_data_cells: MIN_USABLE_DATA_CELLS,
    }
  }

  pub fn or_else(mut self, name: &'static str, parser: Arc<dyn TableParser>) -> Self {
    self.stages.push((name, parser));
    self
  }

  pub fn with_min_data_cells(mut self, min: usize) -> Self {
    self.min_data_cells = min;
    self
  }

  fn is_usable(&self, tables: &[ParsedTable]) -> bool {
    tables
      .iter()
      .any(|t| t.width() >= 2 && t.data_cell_count() > self.min_data_cells)
  }
}

impl TableParser for FallbackParser {
  fn parse<'a>(&'a self, document: &'a SourceDocument) -> ServiceFuture<'a, Vec<ParsedTable>> {
    Box::pin(async move {
      let mut last_non_empty = Vec::new();
      for (name, parser) in &self.stages {
        match parser.parse(document).await {
          Ok(tables) if self.is_usable(&tables) => {
            tracing::info!(
              parser = name,
              tables = tables.len(),
              document = %document.document_id,
              "parsed tables"
            );
            return Ok(tables);
          }
          Ok(tables) => {
            tracing::warn!(parser = name, tables = tables.len(), "parser returned no usable tables");
            if !tables.is_empty() {
              last_non_empty = tables;
            }
          }
          Err(e) => tracing::warn!(parser = name, error = %e, "table parser failed"),
        }
      }
      Ok(last_non_empty)
    })
  }
}
