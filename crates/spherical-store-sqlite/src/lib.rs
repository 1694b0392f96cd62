//! SQLite backends for the Spherical fact store and spec cache.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime.

mod cache;
mod encode;
mod schema;
mod store;

pub mod error;

pub use cache::SqliteCache;
pub use error::{Error, Result};
pub use store::SqliteStore;
