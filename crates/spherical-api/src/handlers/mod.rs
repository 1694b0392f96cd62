//! Route handlers.

pub mod metadata;
pub mod query;
pub mod upload;

use axum::Json;
use serde_json::{Value, json};

/// `GET /health`
pub async fn health() -> Json<Value> { Json(json!({ "status": "ok" })) }
