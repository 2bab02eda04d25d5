//! Storage adapter error types.
//!
//! Backend failures are classified by their S3 error code so the idempotent
//! protocols in [`crate::ensure_bucket`] and [`crate::empty_and_delete_bucket`]
//! can tell "already there" and "already gone" apart from real failures.

/// Storage adapter error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The specified bucket does not exist.
    #[error("The specified bucket does not exist: {bucket}")]
    NoSuchBucket {
        /// The bucket name that was not found.
        bucket: String,
    },

    /// The bucket already exists and is owned by the caller.
    #[error("Bucket already exists and is owned by you: {bucket}")]
    BucketAlreadyOwnedByYou {
        /// The bucket name.
        bucket: String,
    },

    /// The bucket name is taken.
    #[error("The requested bucket name is not available: {bucket}")]
    BucketAlreadyExists {
        /// The bucket name.
        bucket: String,
    },

    /// The bucket still holds objects.
    #[error("The bucket you tried to delete is not empty: {bucket}")]
    BucketNotEmpty {
        /// The bucket name.
        bucket: String,
    },

    /// The connection settings cannot produce a client.
    #[error("invalid connection settings: {0}")]
    InvalidSettings(String),

    /// Any other backend failure (network, throttling, access denied, ...).
    #[error("{operation} failed for bucket {bucket}: {message}")]
    Backend {
        /// The S3 operation that failed.
        operation: &'static str,
        /// The bucket the operation targeted.
        bucket: String,
        /// Backend error description.
        message: String,
    },
}

/// Convenience result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// Build an error from an S3 error code, falling back to [`Self::Backend`].
    #[must_use]
    pub fn from_code(
        code: Option<&str>,
        operation: &'static str,
        bucket: &str,
        message: String,
    ) -> Self {
        let bucket = bucket.to_owned();
        match code {
            Some("NoSuchBucket") => Self::NoSuchBucket { bucket },
            Some("BucketAlreadyOwnedByYou") => Self::BucketAlreadyOwnedByYou { bucket },
            Some("BucketAlreadyExists") => Self::BucketAlreadyExists { bucket },
            Some("BucketNotEmpty") => Self::BucketNotEmpty { bucket },
            _ => Self::Backend {
                operation,
                bucket,
                message,
            },
        }
    }

    /// Whether the bucket is absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoSuchBucket { .. })
    }

    /// Whether a create was rejected because the name is already in use.
    #[must_use]
    pub fn is_already_present(&self) -> bool {
        matches!(
            self,
            Self::BucketAlreadyOwnedByYou { .. } | Self::BucketAlreadyExists { .. }
        )
    }
}
