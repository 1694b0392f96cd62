//! Brochure ingestion for Spherical.
//!
//! Parsed table fragments are flattened into one fact per (variant, feature),
//! persisted in a single transaction, and the campaign is then completed with
//! `not_mentioned` stubs so every variant covers the whole ontology.

pub mod cells;
pub mod completeness;
pub mod error;
pub mod flatten;
pub mod parser;
pub mod pipeline;
pub mod table;
pub mod unify;

pub use completeness::enforce_completeness;
pub use error::{Error, Result};
pub use flatten::{BatchSpec, TableFlattener};
pub use parser::FallbackParser;
pub use pipeline::{IngestReport, IngestRequest, Ingestor};
pub use unify::VariantUnifier;

#[cfg(test)]
mod tests;
