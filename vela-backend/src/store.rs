//! Remote store trait and creation settings

use async_trait::async_trait;
use hcl::Map;

use crate::error::BackendResult;

/// Desired properties of a state bucket about to be created
#[derive(Debug, Clone, Default)]
pub struct BucketSettings {
    /// Bucket name
    pub name: String,
    /// Enable object versioning
    pub versioning: bool,
    /// Enable server-side encryption
    pub ssencryption: bool,
    /// Enable access logging (S3 only)
    pub access_logging: bool,
    /// Tags or labels to attach
    pub tags: Map<String, String>,
    /// Owning project (GCS only)
    pub project: Option<String>,
    /// Bucket location (GCS only)
    pub location: Option<String>,
}

/// Desired properties of a lock table about to be created
#[derive(Debug, Clone, Default)]
pub struct LockTableSettings {
    /// Table name
    pub name: String,
    /// Enable server-side encryption
    pub ssencryption: bool,
    /// Tags to attach
    pub tags: Map<String, String>,
}

/// A remote storage provider for wrapped-tool state.
///
/// Implementations check for and create the storage resources the backend
/// configuration points at. Creation must be idempotent: an "already exists"
/// outcome is a success, never an error, so that concurrent modules sharing a
/// bucket tolerate the check-then-create race.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Whether the named bucket exists
    async fn bucket_exists(&self, name: &str) -> BackendResult<bool>;

    /// Create the bucket with the given settings
    async fn create_bucket(&self, settings: &BucketSettings) -> BackendResult<()>;

    /// Whether the named lock table exists
    async fn lock_table_exists(&self, name: &str) -> BackendResult<bool>;

    /// Create the lock table with the given settings
    async fn create_lock_table(&self, settings: &LockTableSettings) -> BackendResult<()>;
}
