//! Bucket bindings: one object store instance per storage class.

use std::sync::Arc;

use chunkr_core::{AppError, AppResult, BucketProfile, StorageClass};
use chunkr_storage::{ObjectStore, StorageError};

/// One storage class bound to its bucket and store backend.
#[derive(Clone)]
pub struct BucketBinding {
    pub profile: BucketProfile,
    pub store: Arc<dyn ObjectStore>,
}

impl BucketBinding {
    pub fn new(profile: BucketProfile, store: Arc<dyn ObjectStore>) -> Self {
        Self { profile, store }
    }
}

/// The set of configured bindings, looked up by storage class.
#[derive(Clone, Default)]
pub struct BucketBindings {
    bindings: Vec<BucketBinding>,
}

impl BucketBindings {
    pub fn new(bindings: Vec<BucketBinding>) -> Self {
        Self { bindings }
    }

    pub fn for_class(&self, class: StorageClass) -> AppResult<&BucketBinding> {
        self.bindings
            .iter()
            .find(|binding| binding.profile.class == class)
            .ok_or_else(|| {
                AppError::Internal(format!("no bucket configured for storage class {}", class))
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &BucketBinding> {
        self.bindings.iter()
    }
}

/// Map store-layer errors into the service taxonomy.
pub(crate) fn store_error(err: StorageError) -> AppError {
    match err {
        StorageError::NotFound(path) => AppError::NotFound(path),
        StorageError::SourceMissing(path) => AppError::SourceMissing(path),
        StorageError::InvalidRequest(msg) => AppError::PartInvalid(msg),
        StorageError::Transient(msg) => AppError::TransientStore(msg),
        StorageError::Config(msg) => AppError::Internal(msg),
        StorageError::Io(e) => AppError::TransientStore(e.to_string()),
    }
}
