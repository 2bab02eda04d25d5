//! Capability traits over the storage backend.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::settings::ConnectionSettings;

/// The bucket-level calls the controller makes against a backend.
///
/// Every call is a single round trip; implementations never retry.
#[async_trait]
pub trait ObjectStorage: Send + Sync + fmt::Debug {
    /// `HEAD` bucket. `Ok(false)` when the backend reports it missing.
    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool>;

    /// `PUT` bucket with a location constraint for `region`.
    async fn create_bucket(&self, bucket: &str, region: &str) -> StorageResult<()>;

    /// `GET` bucket?list-type=2, following continuation tokens to the end.
    async fn list_object_keys(&self, bucket: &str) -> StorageResult<Vec<String>>;

    /// `DELETE` object.
    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// `DELETE` bucket. The bucket must be empty.
    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()>;
}

/// Builds an [`ObjectStorage`] handle from connection settings.
pub trait StorageConnector: Send + Sync + fmt::Debug {
    /// Connect with `settings`. Called once per reconcile pass.
    fn connect(&self, settings: &ConnectionSettings) -> StorageResult<Arc<dyn ObjectStorage>>;
}
