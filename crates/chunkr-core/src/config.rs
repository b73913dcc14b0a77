//! Configuration module
//!
//! Environment-based configuration for the coordinator, the consistency
//! pipeline and the reconciler. Every knob has a conservative default so a
//! development setup only needs the bucket names and (for the Postgres
//! backend) a database URL.

use std::env;

use crate::models::{BucketProfile, StorageClass};

const SESSION_TTL_HOURS: i64 = 24;
const STALE_CHUNK_THRESHOLD_HOURS: i64 = 24;
const RECONCILE_INTERVAL_SECS: u64 = 3600;
const PERSIST_MAX_ATTEMPTS: u32 = 3;
const PERSIST_BACKOFF_CAP_SECS: u64 = 300;
const PRESIGN_TTL_SECS: u64 = 900;
const PIPELINE_QUEUE_DEPTH: usize = 256;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: Option<String>,
    pub public_bucket: String,
    pub private_bucket: String,
    /// Base URL under which objects in the public bucket are directly
    /// addressable (endpoint or CDN front).
    pub public_base_url: Option<String>,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO etc.).
    pub s3_endpoint: Option<String>,
    /// How long a session may live before it is considered abandoned.
    pub session_ttl_hours: i64,
    /// Minimum age of a non-final object before the stale-chunk sweep may
    /// delete it. Must be generous relative to expected upload duration.
    pub stale_chunk_threshold_hours: i64,
    /// Interval between reconciler runs.
    pub reconcile_interval_secs: u64,
    /// Attempt ceiling for metadata persistence in the pipeline.
    pub persist_max_attempts: u32,
    /// Cap for the exponential persist backoff.
    pub persist_backoff_cap_secs: u64,
    pub presign_ttl_secs: u64,
    pub pipeline_queue_depth: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let config = Config {
            database_url: env::var("DATABASE_URL").ok(),
            public_bucket: env::var("PUBLIC_BUCKET")
                .unwrap_or_else(|_| "public-files".to_string()),
            private_bucket: env::var("PRIVATE_BUCKET")
                .unwrap_or_else(|_| "private-files".to_string()),
            public_base_url: env::var("PUBLIC_BASE_URL").ok().filter(|s| !s.is_empty()),
            s3_region: env::var("S3_REGION").ok(),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            session_ttl_hours: env::var("SESSION_TTL_HOURS")
                .unwrap_or_else(|_| SESSION_TTL_HOURS.to_string())
                .parse()
                .unwrap_or(SESSION_TTL_HOURS),
            stale_chunk_threshold_hours: env::var("STALE_CHUNK_THRESHOLD_HOURS")
                .unwrap_or_else(|_| STALE_CHUNK_THRESHOLD_HOURS.to_string())
                .parse()
                .unwrap_or(STALE_CHUNK_THRESHOLD_HOURS),
            reconcile_interval_secs: env::var("RECONCILE_INTERVAL_SECS")
                .unwrap_or_else(|_| RECONCILE_INTERVAL_SECS.to_string())
                .parse()
                .unwrap_or(RECONCILE_INTERVAL_SECS),
            persist_max_attempts: env::var("PERSIST_MAX_ATTEMPTS")
                .unwrap_or_else(|_| PERSIST_MAX_ATTEMPTS.to_string())
                .parse()
                .unwrap_or(PERSIST_MAX_ATTEMPTS),
            persist_backoff_cap_secs: env::var("PERSIST_BACKOFF_CAP_SECS")
                .unwrap_or_else(|_| PERSIST_BACKOFF_CAP_SECS.to_string())
                .parse()
                .unwrap_or(PERSIST_BACKOFF_CAP_SECS),
            presign_ttl_secs: env::var("PRESIGN_TTL_SECS")
                .unwrap_or_else(|_| PRESIGN_TTL_SECS.to_string())
                .parse()
                .unwrap_or(PRESIGN_TTL_SECS),
            pipeline_queue_depth: env::var("PIPELINE_QUEUE_DEPTH")
                .unwrap_or_else(|_| PIPELINE_QUEUE_DEPTH.to_string())
                .parse()
                .unwrap_or(PIPELINE_QUEUE_DEPTH),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.public_bucket.is_empty() || self.private_bucket.is_empty() {
            return Err(anyhow::anyhow!(
                "PUBLIC_BUCKET and PRIVATE_BUCKET must not be empty"
            ));
        }
        if self.public_bucket == self.private_bucket {
            return Err(anyhow::anyhow!(
                "PUBLIC_BUCKET and PRIVATE_BUCKET must name different buckets"
            ));
        }
        if self.session_ttl_hours <= 0 {
            return Err(anyhow::anyhow!("SESSION_TTL_HOURS must be positive"));
        }
        if self.stale_chunk_threshold_hours <= 0 {
            return Err(anyhow::anyhow!(
                "STALE_CHUNK_THRESHOLD_HOURS must be positive"
            ));
        }
        if self.persist_max_attempts == 0 {
            return Err(anyhow::anyhow!("PERSIST_MAX_ATTEMPTS must be at least 1"));
        }
        Ok(())
    }

    /// Bucket capability for the given storage class.
    pub fn bucket_profile(&self, class: StorageClass) -> BucketProfile {
        match class {
            StorageClass::Public => {
                let mut profile = BucketProfile::new(class, self.public_bucket.clone());
                if let Some(ref base) = self.public_base_url {
                    profile = profile.with_public_base_url(base.clone());
                }
                profile
            }
            StorageClass::Private => BucketProfile::new(class, self.private_bucket.clone()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: None,
            public_bucket: "public-files".to_string(),
            private_bucket: "private-files".to_string(),
            public_base_url: None,
            s3_region: None,
            s3_endpoint: None,
            session_ttl_hours: SESSION_TTL_HOURS,
            stale_chunk_threshold_hours: STALE_CHUNK_THRESHOLD_HOURS,
            reconcile_interval_secs: RECONCILE_INTERVAL_SECS,
            persist_max_attempts: PERSIST_MAX_ATTEMPTS,
            persist_backoff_cap_secs: PERSIST_BACKOFF_CAP_SECS,
            presign_ttl_secs: PRESIGN_TTL_SECS,
            pipeline_queue_depth: PIPELINE_QUEUE_DEPTH,
        }
    }
}
