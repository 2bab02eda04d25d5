//! Integration tests for the quobject storage adapter and engine.
//!
//! These tests require a running S3-compatible server (RustStack, LocalStack
//! or MinIO) at `S3_ENDPOINT_URL`, default `http://localhost:4566`.
//! They are marked `#[ignore]` so they don't run during normal `cargo test`.
//!
//! Run them with:
//! ```text
//! cargo test -p quobject-integration -- --ignored
//! ```

use std::sync::Once;

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use quobject_s3::ConnectionSettings;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Endpoint URL for the server.
fn endpoint_url() -> String {
    std::env::var("S3_ENDPOINT_URL").unwrap_or_else(|_| "http://localhost:4566".to_owned())
}

fn access_key() -> String {
    std::env::var("S3_ACCESS_KEY").unwrap_or_else(|_| "test".to_owned())
}

fn secret_key() -> String {
    std::env::var("S3_SECRET_KEY").unwrap_or_else(|_| "test".to_owned())
}

/// Connection settings for the controller's storage adapter.
#[must_use]
pub fn connection_settings() -> ConnectionSettings {
    init_tracing();

    let endpoint = endpoint_url();
    ConnectionSettings::builder()
        .use_ssl(endpoint.starts_with("https://"))
        .endpoint(endpoint)
        .access_key(access_key())
        .secret_key(secret_key())
        .build()
}

/// Create a raw S3 client, used to seed and inspect buckets.
#[must_use]
pub fn s3_client() -> aws_sdk_s3::Client {
    init_tracing();

    let creds = Credentials::new(access_key(), secret_key(), None, None, "integration-test");

    let config = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(creds)
        .endpoint_url(endpoint_url())
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(config)
}

/// Generate a unique bucket name for a test.
#[must_use]
pub fn test_bucket_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

/// Whether the bucket exists, according to the raw client.
pub async fn bucket_exists(client: &aws_sdk_s3::Client, bucket: &str) -> bool {
    client.head_bucket().bucket(bucket).send().await.is_ok()
}

/// Upload `count` small objects named `obj-00000`, `obj-00001`, ...
pub async fn put_objects(client: &aws_sdk_s3::Client, bucket: &str, count: usize) {
    let keys: Vec<String> = (0..count).map(|i| format!("obj-{i:05}")).collect();
    for chunk in keys.chunks(50) {
        let uploads = chunk.iter().map(|key| {
            client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(aws_sdk_s3::primitives::ByteStream::from_static(b"payload"))
                .send()
        });
        for result in futures::future::join_all(uploads).await {
            result.unwrap_or_else(|e| panic!("failed to upload to {bucket}: {e}"));
        }
    }
}

/// Delete all objects in a bucket, then delete the bucket.
pub async fn cleanup_bucket(client: &aws_sdk_s3::Client, bucket: &str) {
    let mut continuation_token = None;
    loop {
        let mut req = client.list_objects_v2().bucket(bucket);
        if let Some(token) = continuation_token.take() {
            req = req.continuation_token(token);
        }
        let Ok(resp) = req.send().await else {
            return; // Bucket may not exist.
        };

        for obj in resp.contents() {
            if let Some(key) = obj.key() {
                let _ = client.delete_object().bucket(bucket).key(key).send().await;
            }
        }

        if resp.is_truncated() == Some(true) {
            continuation_token = resp.next_continuation_token().map(ToOwned::to_owned);
        } else {
            break;
        }
    }

    let _ = client.delete_bucket().bucket(bucket).send().await;
}

mod test_engine;
mod test_storage;
