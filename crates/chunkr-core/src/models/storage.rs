use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage visibility class.
///
/// `Public` objects are directly URL-addressable; `Private` objects are only
/// reachable through presigned URLs or a proxy. Each class maps to its own
/// bucket, and deduplication is scoped per class: the same content hash may
/// exist once in each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storage_class", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum StorageClass {
    Public,
    Private,
}

impl FromStr for StorageClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(StorageClass::Public),
            "private" => Ok(StorageClass::Private),
            _ => Err(anyhow::anyhow!("Invalid storage class: {}", s)),
        }
    }
}

impl Display for StorageClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageClass::Public => write!(f, "public"),
            StorageClass::Private => write!(f, "private"),
        }
    }
}

/// Bucket capability for one storage class: where objects of that class live
/// and how their URLs are issued. One coordinator parameterized by this struct
/// serves both classes.
#[derive(Debug, Clone)]
pub struct BucketProfile {
    pub class: StorageClass,
    pub bucket: String,
    /// Base URL for direct access. Only meaningful for `Public`; `Private`
    /// access always goes through presigned URLs.
    pub public_base_url: Option<String>,
}

impl BucketProfile {
    pub fn new(class: StorageClass, bucket: impl Into<String>) -> Self {
        Self {
            class,
            bucket: bucket.into(),
            public_base_url: None,
        }
    }

    pub fn with_public_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.public_base_url = Some(base_url.into());
        self
    }

    pub fn is_public(&self) -> bool {
        self.class == StorageClass::Public
    }
}

/// A listing entry read from the object store. Never persisted; used only for
/// reconciliation comparisons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreObject {
    pub path: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}
