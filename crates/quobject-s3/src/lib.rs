//! Bucket lifecycle operations against S3-compatible object storage.
//!
//! The controller only needs five backend calls (head, create, list, delete
//! object, delete bucket). They sit behind the [`ObjectStorage`] trait so the
//! idempotent protocols built on top of them, [`ensure_bucket`] and
//! [`empty_and_delete_bucket`], can run against either the AWS SDK client or
//! the in-memory backend used in tests.
//!
//! # Architecture
//!
//! ```text
//! ConnectionSettings (endpoint, region, keys, TLS flags)
//!        |
//!        v
//! StorageConnector::connect ──> Arc<dyn ObjectStorage>
//!        |                          |
//!   AwsConnector              InMemoryObjectStorage
//!        |
//!        v
//! ensure_bucket / empty_and_delete_bucket
//! ```
//!
//! A fresh client is built for every connect call; nothing is cached, so
//! rotated credentials take effect on the next reconcile pass.

pub mod aws;
pub mod error;
pub mod memory;
mod ops;
pub mod settings;
mod storage;
mod tls;

pub use aws::{AwsConnector, AwsObjectStorage};
pub use error::{StorageError, StorageResult};
pub use memory::{InMemoryObjectStorage, StorageOperation};
pub use ops::{empty_and_delete_bucket, ensure_bucket};
pub use settings::ConnectionSettings;
pub use storage::{ObjectStorage, StorageConnector};
