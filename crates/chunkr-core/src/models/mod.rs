//! Data models for the upload coordinator, organized by domain.

mod event;
mod file;
mod session;
mod storage;

// Re-export all models for convenient imports
pub use event::*;
pub use file::*;
pub use session::*;
pub use storage::*;
