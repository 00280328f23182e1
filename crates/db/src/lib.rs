//! Database layer for the POI registry.
//!
//! Provides the PostgreSQL pool, the embedded schema migrations and the
//! read-side selectors used by operators and the web application.

pub mod models;
pub mod pool;
pub mod selectors;
pub mod stats;

pub use pool::{normalize_database_url, DbPool};
pub use selectors::{LookupError, LookupResult};
