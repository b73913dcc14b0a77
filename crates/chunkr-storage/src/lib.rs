//! Object store backends for the upload coordinator.
//!
//! This crate provides the ObjectStore trait plus two implementations: an
//! S3-compatible backend for production and an in-memory backend for tests
//! and local development.
//!
//! # Object path conventions
//!
//! Paths are bucket-relative keys. The coordinator writes chunk objects at
//! `{sessionId}/{chunkNumber}` and the merge engine composes them into
//! date-partitioned final objects; see `chunkr_core::paths` for the builders
//! and predicates shared by all backends.

pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use memory::MemoryObjectStore;
#[cfg(feature = "storage-s3")]
pub use s3::S3ObjectStore;
pub use traits::{ObjectStore, StorageError, StorageResult};
