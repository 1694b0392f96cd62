//! Spec-matrix layout detection: which row holds the trim names, which
//! column (if any) holds a category hint, and where the data rows start.

use spherical_core::services::{ParsedTable, is_blank_cell};

/// Body rows considered as header candidates, after the native columns.
const HEADER_SEARCH_ROWS: usize = 4;

/// Characters separating the parts of a merged trim header cell, e.g.
/// `VXi | VXi AGS`.
const MERGED_HEADER_SEPARATORS: [char; 3] = ['\n', '/', '|'];

/// A data column holding one trim's values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimColumn {
  pub column: usize,
  /// Header cell as printed.
  pub raw_label: String,
  /// First segment of a merged header cell, before unification.
  pub label: String,
}

/// The interpreted shape of one table fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
  /// Body row holding the header; `None` when the native columns won.
  pub header_row:      Option<usize>,
  /// Column carrying a per-row category hint.
  pub category_column: Option<usize>,
  pub trims:           Vec<TrimColumn>,
}

impl TableLayout {
  /// Detect the layout of `table`, or `None` when the fragment is malformed
  /// (no body rows, fewer than two columns, or no trim columns).
  pub fn detect(table: &ParsedTable) -> Option<Self> {
    if table.rows.is_empty() || table.width() < 2 {
      return None;
    }

    let (header_row, header) = pick_header(table);
    let category_column = header
      .get(1)
      .filter(|cell| cell.to_lowercase().contains("category"))
      .map(|_| 1);
    let first_trim = category_column.map_or(1, |c| c + 1);

    let trims: Vec<TrimColumn> = header
      .iter()
      .enumerate()
      .skip(first_trim)
      .filter_map(|(column, raw)| {
        let label = raw
          .split(MERGED_HEADER_SEPARATORS)
          .next()
          .unwrap_or_default()
          .trim()
          .to_owned();
        (!is_blank_cell(&label)).then(|| TrimColumn {
          column,
          raw_label: raw.trim().to_owned(),
          label,
        })
      })
      .collect();

    if trims.is_empty() {
      return None;
    }
    Some(Self { header_row, category_column, trims })
  }

  /// Index of the first body row after the header.
  pub fn first_data_row(&self) -> usize { self.header_row.map_or(0, |r| r + 1) }
}

/// Score the native columns and the first few body rows; the native columns
/// win unless a row scores strictly higher.
fn pick_header(table: &ParsedTable) -> (Option<usize>, &[String]) {
  let mut best: (Option<usize>, &[String]) = (None, table.columns.as_slice());
  let mut best_score = header_score(&table.columns);

  for (i, row) in table.rows.iter().take(HEADER_SEARCH_ROWS).enumerate() {
    let score = header_score(row);
    if score > best_score {
      best = (Some(i), row.as_slice());
      best_score = score;
    }
  }
  best
}

/// Distinct non-empty, non-numeric cells after the first column.
fn header_score(cells: &[String]) -> usize {
  let mut seen: Vec<&str> = Vec::new();
  for cell in cells.iter().skip(1) {
    let t = cell.trim();
    if is_blank_cell(t) || looks_numeric(t) || seen.contains(&t) {
      continue;
    }
    seen.push(t);
  }
  seen.len()
}

fn looks_numeric(s: &str) -> bool {
  let stripped: String = s.chars().filter(|c| !matches!(c, ',' | ' ')).collect();
  !stripped.is_empty() && stripped.parse::<f64>().is_ok()
}

/// Blank labels and all-uppercase labels (section banners like `INTERIOR`)
/// carry no feature.
pub fn is_section_row(label: &str) -> bool {
  let t = label.trim();
  if is_blank_cell(t) {
    return true;
  }
  t.chars().any(char::is_alphabetic) && !t.chars().any(char::is_lowercase)
}
