//! HTTP clients for Spherical's external collaborators.
//!
//! [`LlmClient`] speaks the OpenAI-compatible embeddings and chat APIs and
//! implements [`Embedder`](spherical_core::services::Embedder) and
//! [`ChatService`](spherical_core::services::ChatService).
//! [`HttpTableParser`] and [`VisionTableParser`] implement
//! [`TableParser`](spherical_core::services::TableParser) and are usually
//! chained with `spherical_ingest::FallbackParser`.

mod http;

pub mod error;
pub mod llm;
pub mod tables;
pub mod vision;

pub use error::{Error, Result};
pub use llm::{LlmClient, LlmConfig};
pub use tables::HttpTableParser;
pub use vision::VisionTableParser;
