//! Core types and trait definitions for the Spherical vehicle spec store.
//!
//! Variant identity, the fact model, the feature ontology and its resolution
//! cascade, plus the storage, cache, and external-service contracts. This
//! crate has no HTTP or database dependencies; every other crate builds on
//! it.

// Native `async fn` / `impl Future` in traits; the returned futures carry
// explicit `Send` bounds where the runtime needs them.
#![allow(async_fn_in_trait)]

pub mod cache;
pub mod error;
pub mod fact;
pub mod ontology;
pub mod resolver;
pub mod services;
pub mod store;
pub mod variant;

pub use error::{Error, Result};
pub use services::ServiceError;
