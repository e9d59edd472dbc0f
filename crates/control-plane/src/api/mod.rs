// HTTP API routes
//
// Ingestion (API key), realtime (session token) and health. Each submodule
// exposes a `routes` function that the server merges into one router.

pub mod common;
pub mod health;
pub mod ingest;
pub mod realtime;

// Re-export common types
pub use common::{ApiError, ErrorResponse};
