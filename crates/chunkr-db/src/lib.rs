//! Persistence layer for the upload coordinator.
//!
//! Two stores, two traits: `SessionStore` holds in-flight upload sessions,
//! `MetadataStore` is the catalog of finished files keyed by
//! `(content_hash, storage_class)`. Postgres implementations are gated behind
//! the `postgres` feature; the in-memory implementations are always available
//! and back the service test suites.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod metadata;
#[cfg(feature = "postgres")]
pub mod pool;
#[cfg(feature = "postgres")]
pub mod session;
pub mod traits;

// Re-export commonly used types
pub use memory::{MemoryMetadataStore, MemorySessionStore};
#[cfg(feature = "postgres")]
pub use metadata::PgMetadataStore;
#[cfg(feature = "postgres")]
pub use pool::setup_database;
#[cfg(feature = "postgres")]
pub use session::PgSessionStore;
pub use traits::{MetadataStore, SessionStore};
