// Storage layer for PulseBoard
// Decision: Support both PostgreSQL (production) and in-memory (dev mode)
//
// This crate provides implementations of the core collaborator traits:
// - EventStore: durable event log (insert, recent feed, window counts, retention)
// - ProjectDirectory: API key resolution and ownership lookups

pub mod backend;
pub mod memory;
pub mod models;
pub mod repositories;

pub use backend::StorageBackend;
pub use memory::InMemoryDatabase;
pub use models::*;
pub use repositories::Database;

/// Generate a fresh project API key: `pb_` followed by 48 hex characters.
pub fn generate_api_key() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("pb_{}", hex::encode(bytes))
}
