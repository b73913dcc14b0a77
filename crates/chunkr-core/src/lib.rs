//! Chunkr Core Library
//!
//! Domain models, error types, configuration, and object-path conventions
//! shared across all Chunkr components. This crate does no I/O; the storage
//! and catalog backends live in `chunkr-storage` and `chunkr-db`.

pub mod config;
pub mod error;
pub mod models;
pub mod paths;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{
    BucketProfile, FinalizedFile, InitUploadRequest, MergedEvent, SessionStatus, SessionView,
    StorageClass, StoreObject, UploadSession,
};
