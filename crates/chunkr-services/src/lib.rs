//! Service layer for the chunked-upload coordinator.
//!
//! This crate hosts the orchestration services: the SessionCoordinator
//! (session lifecycle and chunk intake), the MergeEngine (claim, validate,
//! compose), the ConsistencyPipeline (asynchronous metadata persist and chunk
//! cleanup), the Reconciler (scheduled storage-recovery sweeps) and the
//! FileService (access to finalized files). All services depend only on the
//! store traits, so the same code runs against Postgres + S3 in production
//! and the in-memory backends in tests.

pub mod bindings;
pub mod coordinator;
pub mod files;
pub mod merge;
pub mod pipeline;
pub mod reconciler;

pub use bindings::{BucketBinding, BucketBindings};
pub use coordinator::SessionCoordinator;
pub use files::FileService;
pub use merge::MergeEngine;
pub use pipeline::ConsistencyPipeline;
pub use reconciler::Reconciler;
