//! Error types for `spherical-services`.
//!
//! Only construction can fail with [`Error`]. Calls made through the service
//! traits report [`spherical_core::ServiceError`] instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("failed to build HTTP client: {0}")]
  Client(#[from] reqwest::Error),

  #[error("invalid service configuration: {0}")]
  InvalidConfig(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
