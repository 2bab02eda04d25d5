//! Idempotent bucket protocols built on [`ObjectStorage`].

use tracing::{debug, info};

use crate::error::StorageResult;
use crate::storage::ObjectStorage;

/// Make sure `bucket` exists.
///
/// Probes first and only creates when the probe does not find the bucket. A
/// create rejected with `BucketAlreadyOwnedByYou` or `BucketAlreadyExists`
/// counts as success, so this is safe to call on every pass and on retries
/// after a partial failure. Any other create error is returned.
pub async fn ensure_bucket(
    storage: &dyn ObjectStorage,
    bucket: &str,
    region: &str,
) -> StorageResult<()> {
    match storage.bucket_exists(bucket).await {
        Ok(true) => {
            debug!(bucket, "bucket already exists");
            return Ok(());
        }
        Ok(false) => {}
        Err(e) => debug!(bucket, error = %e, "existence probe failed, attempting create"),
    }

    match storage.create_bucket(bucket, region).await {
        Ok(()) => {
            info!(bucket, region, "bucket created");
            Ok(())
        }
        Err(e) if e.is_already_present() => {
            debug!(bucket, error = %e, "bucket already present, treating create as done");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Delete every object in `bucket`, then the bucket itself.
///
/// Objects are deleted one by one. The first failed object delete aborts the
/// sequence before the bucket delete, leaving the remaining objects for the
/// next attempt to list. A bucket that is already gone is a success.
pub async fn empty_and_delete_bucket(storage: &dyn ObjectStorage, bucket: &str) -> StorageResult<()> {
    let keys = match storage.list_object_keys(bucket).await {
        Ok(keys) => keys,
        Err(e) if e.is_not_found() => {
            debug!(bucket, "bucket already gone");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    for key in &keys {
        storage.delete_object(bucket, key).await?;
    }
    debug!(bucket, objects = keys.len(), "bucket emptied");

    match storage.delete_bucket(bucket).await {
        Ok(()) => {
            info!(bucket, objects = keys.len(), "bucket deleted");
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            debug!(bucket, "bucket vanished before delete");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::memory::{InMemoryObjectStorage, StorageOperation};

    #[tokio::test]
    async fn test_should_create_missing_bucket() {
        let backend = InMemoryObjectStorage::new();
        let session = backend.session("owner");

        ensure_bucket(&session, "fresh", "eu-west-1")
            .await
            .unwrap_or_else(|e| panic!("ensure failed: {e}"));

        assert!(backend.contains_bucket("fresh"));
        assert_eq!(backend.bucket_region("fresh").as_deref(), Some("eu-west-1"));
        assert_eq!(backend.calls(StorageOperation::CreateBucket), 1);
    }

    #[tokio::test]
    async fn test_should_not_create_existing_bucket() {
        let backend = InMemoryObjectStorage::new();
        let session = backend.session("owner");

        ensure_bucket(&session, "twice", "us-east-1")
            .await
            .unwrap_or_else(|e| panic!("first ensure failed: {e}"));
        ensure_bucket(&session, "twice", "us-east-1")
            .await
            .unwrap_or_else(|e| panic!("second ensure failed: {e}"));

        assert_eq!(backend.calls(StorageOperation::BucketExists), 2);
        assert_eq!(backend.calls(StorageOperation::CreateBucket), 1);
    }

    #[tokio::test]
    async fn test_should_treat_already_owned_as_success_when_probe_fails() {
        let backend = InMemoryObjectStorage::new();
        let session = backend.session("owner");
        ensure_bucket(&session, "racy", "us-east-1")
            .await
            .unwrap_or_else(|e| panic!("ensure failed: {e}"));

        backend.fail_next(StorageOperation::BucketExists, 1);
        ensure_bucket(&session, "racy", "us-east-1")
            .await
            .unwrap_or_else(|e| panic!("ensure after failed probe: {e}"));

        assert_eq!(backend.calls(StorageOperation::CreateBucket), 2);
    }

    #[tokio::test]
    async fn test_should_treat_already_exists_as_success() {
        let backend = InMemoryObjectStorage::new();
        backend
            .session("someone-else")
            .create_bucket("taken", "us-east-1")
            .await
            .unwrap_or_else(|e| panic!("seed failed: {e}"));

        // The probe sees a foreign bucket as present, so force the create path.
        backend.fail_next(StorageOperation::BucketExists, 1);
        let result = ensure_bucket(&backend.session("owner"), "taken", "us-east-1").await;
        assert!(result.is_ok(), "got {result:?}");
    }

    #[tokio::test]
    async fn test_should_propagate_other_create_errors() {
        let backend = InMemoryObjectStorage::new();
        backend.fail_next(StorageOperation::CreateBucket, 1);

        let result = ensure_bucket(&backend.session("owner"), "b", "us-east-1").await;
        assert!(
            matches!(result, Err(StorageError::Backend { operation: "CreateBucket", .. })),
            "got {result:?}"
        );
        assert!(!backend.contains_bucket("b"));
    }

    #[tokio::test]
    async fn test_should_empty_and_delete_bucket() {
        let backend = InMemoryObjectStorage::new();
        let session = backend.session("owner");
        session
            .create_bucket("full", "us-east-1")
            .await
            .unwrap_or_else(|e| panic!("create failed: {e}"));
        for key in ["a.txt", "b/c.txt", "d"] {
            backend
                .put_object("full", key, &b"data"[..])
                .unwrap_or_else(|e| panic!("put failed: {e}"));
        }

        empty_and_delete_bucket(&session, "full")
            .await
            .unwrap_or_else(|e| panic!("delete failed: {e}"));

        assert!(!backend.contains_bucket("full"));
        assert_eq!(backend.calls(StorageOperation::DeleteObject), 3);

        // Second call on the absent bucket is a no-op.
        empty_and_delete_bucket(&session, "full")
            .await
            .unwrap_or_else(|e| panic!("repeat delete failed: {e}"));
        assert_eq!(backend.calls(StorageOperation::DeleteBucket), 1);
    }

    #[tokio::test]
    async fn test_should_abort_before_bucket_delete_on_object_failure() {
        let backend = InMemoryObjectStorage::new();
        let session = backend.session("owner");
        session
            .create_bucket("partial", "us-east-1")
            .await
            .unwrap_or_else(|e| panic!("create failed: {e}"));
        for key in ["1", "2", "3"] {
            backend
                .put_object("partial", key, &b"x"[..])
                .unwrap_or_else(|e| panic!("put failed: {e}"));
        }

        backend.fail_after(StorageOperation::DeleteObject, 1);
        let result = empty_and_delete_bucket(&session, "partial").await;

        assert!(result.is_err());
        assert_eq!(backend.calls(StorageOperation::DeleteBucket), 0);
        assert_eq!(backend.object_keys("partial"), vec!["2".to_owned(), "3".to_owned()]);

        // A retry picks up where the first attempt stopped.
        empty_and_delete_bucket(&session, "partial")
            .await
            .unwrap_or_else(|e| panic!("retry failed: {e}"));
        assert!(!backend.contains_bucket("partial"));
    }

    #[tokio::test]
    async fn test_should_propagate_list_failure() {
        let backend = InMemoryObjectStorage::new();
        let session = backend.session("owner");
        session
            .create_bucket("b", "us-east-1")
            .await
            .unwrap_or_else(|e| panic!("create failed: {e}"));

        backend.fail_next(StorageOperation::ListObjectKeys, 1);
        assert!(empty_and_delete_bucket(&session, "b").await.is_err());
        assert!(backend.contains_bucket("b"));
    }
}
