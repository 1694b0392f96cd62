//! Shared request plumbing for the HTTP clients.

use std::time::Duration;

use reqwest::{Client, Response};
use spherical_core::ServiceError;

use crate::{Error, Result};

pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
  Ok(Client::builder().timeout(timeout).build()?)
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
  format!(
    "{}/{}",
    base_url.trim_end_matches('/'),
    path.trim_start_matches('/')
  )
}

pub(crate) fn require_url(name: &str, url: &str) -> Result<()> {
  if url.starts_with("http://") || url.starts_with("https://") {
    Ok(())
  } else {
    Err(Error::InvalidConfig(format!("{name} must be an http(s) URL, got {url:?}")))
  }
}

/// Map a request failure onto the service taxonomy.
pub(crate) fn transport(e: reqwest::Error) -> ServiceError {
  if e.is_timeout() {
    ServiceError::Timeout
  } else {
    ServiceError::Transport(e.to_string())
  }
}

/// Turn a non-2xx response into an error carrying (a prefix of) its body.
pub(crate) async fn check_status(resp: Response) -> Result<Response, ServiceError> {
  let status = resp.status();
  if status.is_success() {
    return Ok(resp);
  }
  let body = resp.text().await.unwrap_or_default();
  let body: String = body.chars().take(200).collect();
  if status.is_server_error() || status.as_u16() == 429 {
    Err(ServiceError::Unavailable(format!("{status}: {body}")))
  } else {
    Err(ServiceError::InvalidResponse(format!("{status}: {body}")))
  }
}
