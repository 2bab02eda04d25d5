//! Storage adapter integration tests.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use quobject_s3::{
        AwsConnector, ObjectStorage, StorageConnector, empty_and_delete_bucket, ensure_bucket,
    };

    use crate::{
        bucket_exists, cleanup_bucket, connection_settings, put_objects, s3_client,
        test_bucket_name,
    };

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_ensure_bucket_twice() {
        let client = s3_client();
        let bucket = test_bucket_name("ensure");
        let storage = AwsConnector::new()
            .with_operation_timeout(Duration::from_secs(30))
            .connect(&connection_settings())
            .unwrap_or_else(|e| panic!("connect failed: {e}"));

        ensure_bucket(storage.as_ref(), &bucket, "us-east-1")
            .await
            .unwrap_or_else(|e| panic!("first ensure failed: {e}"));
        ensure_bucket(storage.as_ref(), &bucket, "us-east-1")
            .await
            .unwrap_or_else(|e| panic!("second ensure failed: {e}"));
        assert!(bucket_exists(&client, &bucket).await);

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_report_missing_bucket() {
        let storage = AwsConnector::new()
            .connect(&connection_settings())
            .unwrap_or_else(|e| panic!("connect failed: {e}"));

        let exists = storage
            .bucket_exists(&test_bucket_name("absent"))
            .await
            .unwrap_or_else(|e| panic!("probe failed: {e}"));
        assert!(!exists);
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_empty_and_delete_bucket_across_pages() {
        let client = s3_client();
        let bucket = test_bucket_name("paged");
        let storage = AwsConnector::new()
            .connect(&connection_settings())
            .unwrap_or_else(|e| panic!("connect failed: {e}"));

        ensure_bucket(storage.as_ref(), &bucket, "us-east-1")
            .await
            .unwrap_or_else(|e| panic!("ensure failed: {e}"));
        // More than one ListObjectsV2 page.
        put_objects(&client, &bucket, 1_050).await;

        let keys = storage
            .list_object_keys(&bucket)
            .await
            .unwrap_or_else(|e| panic!("list failed: {e}"));
        assert_eq!(keys.len(), 1_050);

        empty_and_delete_bucket(storage.as_ref(), &bucket)
            .await
            .unwrap_or_else(|e| panic!("delete failed: {e}"));
        assert!(!bucket_exists(&client, &bucket).await);

        // The bucket is gone; a second run is a no-op.
        empty_and_delete_bucket(storage.as_ref(), &bucket)
            .await
            .unwrap_or_else(|e| panic!("repeat delete failed: {e}"));
    }
}
