//! [`ObjectStorage`] over the AWS SDK S3 client.
//!
//! Works against any S3-compatible endpoint: requests use path-style
//! addressing and the endpoint URL is taken from [`ConnectionSettings`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::head_bucket::HeadBucketError;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::settings::{ConnectionSettings, location_constraint};
use crate::storage::{ObjectStorage, StorageConnector};
use crate::tls::insecure_http_client;

const CREDENTIALS_PROVIDER: &str = "quobject-credentials-secret";

/// Builds [`AwsObjectStorage`] clients from connection settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct AwsConnector {
    operation_timeout: Option<Duration>,
}

impl AwsConnector {
    /// Connector with SDK default timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every S3 operation, retries included, by `timeout`.
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }
}

impl StorageConnector for AwsConnector {
    fn connect(&self, settings: &ConnectionSettings) -> StorageResult<Arc<dyn ObjectStorage>> {
        Ok(Arc::new(AwsObjectStorage::new(
            settings,
            self.operation_timeout,
        )?))
    }
}

/// S3 client wrapper implementing [`ObjectStorage`].
#[derive(Clone)]
pub struct AwsObjectStorage {
    client: aws_sdk_s3::Client,
}

impl fmt::Debug for AwsObjectStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsObjectStorage").finish_non_exhaustive()
    }
}

impl AwsObjectStorage {
    /// Build a client for `settings`.
    pub fn new(
        settings: &ConnectionSettings,
        operation_timeout: Option<Duration>,
    ) -> StorageResult<Self> {
        settings.validate()?;

        let creds = Credentials::new(
            &settings.access_key,
            &settings.secret_key,
            None,
            None,
            CREDENTIALS_PROVIDER,
        );

        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.effective_region().to_owned()))
            .credentials_provider(creds)
            .endpoint_url(settings.endpoint_url())
            .force_path_style(true);

        if let Some(timeout) = operation_timeout {
            builder = builder.timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(timeout)
                    .build(),
            );
        }

        if settings.use_ssl && settings.insecure_skip_verify {
            debug!(endpoint = %settings.endpoint_url(), "certificate verification disabled");
            builder = builder.http_client(insecure_http_client());
        }

        Ok(Self::from_client(aws_sdk_s3::Client::from_conf(
            builder.build(),
        )))
    }

    /// Wrap an already configured client.
    #[must_use]
    pub fn from_client(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

fn classify<E, R>(err: &SdkError<E, R>, operation: &'static str, bucket: &str) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: fmt::Debug,
{
    StorageError::from_code(
        err.code(),
        operation,
        bucket,
        DisplayErrorContext(err).to_string(),
    )
}

#[async_trait]
impl ObjectStorage for AwsObjectStorage {
    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                // HEAD responses carry no body, so a bare 404 is all some
                // backends send back.
                let missing = err
                    .as_service_error()
                    .is_some_and(HeadBucketError::is_not_found)
                    || err
                        .raw_response()
                        .is_some_and(|resp| resp.status().as_u16() == 404);
                if missing {
                    Ok(false)
                } else {
                    Err(classify(&err, "HeadBucket", bucket))
                }
            }
        }
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> StorageResult<()> {
        let mut req = self.client.create_bucket().bucket(bucket);
        if let Some(constraint) = location_constraint(region) {
            req = req.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(constraint))
                    .build(),
            );
        }
        req.send()
            .await
            .map_err(|e| classify(&e, "CreateBucket", bucket))?;
        Ok(())
    }

    async fn list_object_keys(&self, bucket: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token = None;
        loop {
            let mut req = self.client.list_objects_v2().bucket(bucket);
            if let Some(token) = continuation_token.take() {
                req = req.continuation_token(token);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| classify(&e, "ListObjectsV2", bucket))?;

            keys.extend(
                resp.contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(ToOwned::to_owned)),
            );

            if resp.is_truncated() == Some(true) {
                continuation_token = resp.next_continuation_token().map(ToOwned::to_owned);
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }
        Ok(keys)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(&e, "DeleteObject", bucket))?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify(&e, "DeleteBucket", bucket))?;
        Ok(())
    }
}
