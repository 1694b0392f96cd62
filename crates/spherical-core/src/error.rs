//! Error types for `spherical-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid ontology definition: {0}")]
  InvalidOntology(String),

  #[error("ontology parse error: {0}")]
  OntologyParse(#[from] toml::de::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
