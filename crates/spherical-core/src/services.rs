//! Contracts for the external collaborators: table parsing, embeddings, and
//! chat completion.
//!
//! All three are long-latency, best-effort network services. Their traits are
//! object-safe so the server can choose implementations from configuration at
//! runtime, and every failure is a [`ServiceError`] that callers degrade on
//! rather than propagate.

use std::{future::Future, pin::Pin};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed future returned by the service traits.
pub type ServiceFuture<'a, T> =
  Pin<Box<dyn Future<Output = Result<T, ServiceError>> + Send + 'a>>;

#[derive(Debug, Clone, Error)]
pub enum ServiceError {
  #[error("service call timed out")]
  Timeout,

  #[error("transport error: {0}")]
  Transport(String),

  #[error("invalid response: {0}")]
  InvalidResponse(String),

  #[error("service unavailable: {0}")]
  Unavailable(String),
}

// ─── Table parsing ───────────────────────────────────────────────────────────

/// Which pages of a document to parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "pages", rename_all = "snake_case")]
pub enum PageSelection {
  #[default]
  All,
  /// 1-based page numbers.
  Pages(Vec<u32>),
}

/// An uploaded document awaiting table extraction.
#[derive(Debug, Clone)]
pub struct SourceDocument {
  pub document_id: String,
  pub bytes:       Bytes,
  pub pages:       PageSelection,
}

/// One table fragment as returned by a table parser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTable {
  /// The parser's own column labels; may be empty or positional (`0`, `1`).
  #[serde(default)]
  pub columns: Vec<String>,
  /// Body rows. Rows may be ragged.
  pub rows:    Vec<Vec<String>>,
  /// 1-based page the table was found on.
  pub page:    u32,
}

impl ParsedTable {
  pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>, page: u32) -> Self {
    Self { columns, rows, page }
  }

  /// Width of the widest row (or of the column labels).
  pub fn width(&self) -> usize {
    self
      .rows
      .iter()
      .map(Vec::len)
      .chain(std::iter::once(self.columns.len()))
      .max()
      .unwrap_or(0)
  }

  /// Number of non-blank cells outside the first (label) column.
  pub fn data_cell_count(&self) -> usize {
    self
      .rows
      .iter()
      .flat_map(|row| row.iter().skip(1))
      .filter(|cell| !is_blank_cell(cell))
      .count()
  }
}

/// Blank, or a null marker leaked by a dataframe-based parser.
pub fn is_blank_cell(cell: &str) -> bool {
  let t = cell.trim();
  t.is_empty() || t.eq_ignore_ascii_case("nan") || t.eq_ignore_ascii_case("none")
}

/// Converts a document into table fragments.
pub trait TableParser: Send + Sync {
  fn parse<'a>(&'a self, document: &'a SourceDocument) -> ServiceFuture<'a, Vec<ParsedTable>>;
}

// ─── Language services ───────────────────────────────────────────────────────

/// Produces semantic embeddings.
pub trait Embedder: Send + Sync {
  fn embed<'a>(&'a self, text: &'a str) -> ServiceFuture<'a, Vec<f32>>;
}

/// Single-turn chat completion.
pub trait ChatService: Send + Sync {
  fn complete<'a>(&'a self, prompt: &'a str) -> ServiceFuture<'a, String>;
}

/// Strip a surrounding Markdown code fence (```` ```json ... ``` ````) from a
/// model response.
pub fn strip_code_fence(raw: &str) -> &str {
  let t = raw.trim();
  let Some(rest) = t.strip_prefix("```") else {
    return t;
  };
  let rest = rest.strip_prefix("json").unwrap_or(rest);
  rest.strip_suffix("```").unwrap_or(rest).trim()
}
