//! Read path for Spherical.
//!
//! A query names a variant by its structural axes (missing ones are inferred
//! from a stored baseline) and a free-text feature term. The term is resolved
//! through the ontology cascade, served cache-aside from the spec cache and the
//! durable fact store, and rendered as a voice-ready sentence with a citation.

pub mod engine;
pub mod error;
pub mod query;

pub use engine::RetrievalEngine;
pub use error::{Error, Result};
pub use query::{
  Answer, AnswerOrigin, Confidence, ConfigurationMetadata, CrossSellSuggestion, MetadataRequest,
  QueryRequest,
};

#[cfg(test)]
mod tests;
