//! In-memory storage backend.
//!
//! [`InMemoryObjectStorage`] keeps buckets in a `DashMap` and enforces global
//! bucket-name uniqueness the way S3 does: creating a name you already own
//! yields `BucketAlreadyOwnedByYou`, creating a name owned by another access
//! key yields `BucketAlreadyExists`. Each [`StorageConnector::connect`] call
//! returns a session bound to the access key of the settings.
//!
//! Calls are counted per [`StorageOperation`] and failures can be injected,
//! which is what the controller's unit tests lean on.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::settings::ConnectionSettings;
use crate::storage::{ObjectStorage, StorageConnector};

/// The backend calls of [`ObjectStorage`], for counting and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOperation {
    /// `bucket_exists`
    BucketExists,
    /// `create_bucket`
    CreateBucket,
    /// `list_object_keys`
    ListObjectKeys,
    /// `delete_object`
    DeleteObject,
    /// `delete_bucket`
    DeleteBucket,
}

impl StorageOperation {
    fn name(self) -> &'static str {
        match self {
            Self::BucketExists => "HeadBucket",
            Self::CreateBucket => "CreateBucket",
            Self::ListObjectKeys => "ListObjectsV2",
            Self::DeleteObject => "DeleteObject",
            Self::DeleteBucket => "DeleteBucket",
        }
    }
}

#[derive(Debug)]
struct MemoryBucket {
    owner: String,
    region: String,
    objects: BTreeMap<String, Bytes>,
}

/// Pending injected failures for one operation.
#[derive(Debug, Default, Clone, Copy)]
struct Fault {
    /// Calls to let through before failing.
    skip: usize,
    /// Calls to fail after that.
    fail: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    buckets: DashMap<String, MemoryBucket>,
    calls: DashMap<StorageOperation, usize>,
    faults: Mutex<HashMap<StorageOperation, Fault>>,
}

impl MemoryState {
    /// Count the call, then decide whether it should fail.
    fn enter(&self, op: StorageOperation, bucket: &str) -> StorageResult<()> {
        *self.calls.entry(op).or_insert(0) += 1;

        let mut faults = self.faults.lock();
        let Some(fault) = faults.get_mut(&op) else {
            return Ok(());
        };
        if fault.skip > 0 {
            fault.skip -= 1;
            return Ok(());
        }
        if fault.fail == 0 {
            return Ok(());
        }
        fault.fail -= 1;
        if fault.fail == 0 {
            faults.remove(&op);
        }
        Err(StorageError::Backend {
            operation: op.name(),
            bucket: bucket.to_owned(),
            message: "injected failure".to_owned(),
        })
    }
}

/// Shared in-memory backend. Clones share the same buckets.
#[derive(Debug, Clone, Default)]
pub struct InMemoryObjectStorage {
    state: Arc<MemoryState>,
}

impl InMemoryObjectStorage {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A session acting as `owner` (the access key).
    #[must_use]
    pub fn session(&self, owner: &str) -> MemorySession {
        MemorySession {
            state: Arc::clone(&self.state),
            owner: owner.to_owned(),
        }
    }

    /// Store an object directly, bypassing counters and faults.
    pub fn put_object(&self, bucket: &str, key: &str, body: impl Into<Bytes>) -> StorageResult<()> {
        let mut entry =
            self.state
                .buckets
                .get_mut(bucket)
                .ok_or_else(|| StorageError::NoSuchBucket {
                    bucket: bucket.to_owned(),
                })?;
        entry.objects.insert(key.to_owned(), body.into());
        Ok(())
    }

    /// Whether `bucket` exists.
    #[must_use]
    pub fn contains_bucket(&self, bucket: &str) -> bool {
        self.state.buckets.contains_key(bucket)
    }

    /// Region the bucket was created in.
    #[must_use]
    pub fn bucket_region(&self, bucket: &str) -> Option<String> {
        self.state.buckets.get(bucket).map(|b| b.region.clone())
    }

    /// Access key that created the bucket.
    #[must_use]
    pub fn bucket_owner(&self, bucket: &str) -> Option<String> {
        self.state.buckets.get(bucket).map(|b| b.owner.clone())
    }

    /// Keys currently stored in `bucket`, sorted. Empty if the bucket is missing.
    #[must_use]
    pub fn object_keys(&self, bucket: &str) -> Vec<String> {
        self.state
            .buckets
            .get(bucket)
            .map(|b| b.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of calls made to `op` so far, failed ones included.
    #[must_use]
    pub fn calls(&self, op: StorageOperation) -> usize {
        self.state.calls.get(&op).map_or(0, |c| *c)
    }

    /// Fail the next `times` calls to `op`.
    pub fn fail_next(&self, op: StorageOperation, times: usize) {
        self.state
            .faults
            .lock()
            .insert(op, Fault { skip: 0, fail: times });
    }

    /// Let `successes` calls to `op` through, then fail the one after.
    pub fn fail_after(&self, op: StorageOperation, successes: usize) {
        self.state.faults.lock().insert(
            op,
            Fault {
                skip: successes,
                fail: 1,
            },
        );
    }
}

impl StorageConnector for InMemoryObjectStorage {
    fn connect(&self, settings: &ConnectionSettings) -> StorageResult<Arc<dyn ObjectStorage>> {
        settings.validate()?;
        Ok(Arc::new(self.session(&settings.access_key)))
    }
}

/// An [`ObjectStorage`] handle on an [`InMemoryObjectStorage`], acting as one owner.
#[derive(Debug, Clone)]
pub struct MemorySession {
    state: Arc<MemoryState>,
    owner: String,
}

#[async_trait]
impl ObjectStorage for MemorySession {
    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        self.state.enter(StorageOperation::BucketExists, bucket)?;
        Ok(self.state.buckets.contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> StorageResult<()> {
        self.state.enter(StorageOperation::CreateBucket, bucket)?;

        match self.state.buckets.entry(bucket.to_owned()) {
            dashmap::Entry::Occupied(existing) => {
                let bucket = bucket.to_owned();
                if existing.get().owner == self.owner {
                    Err(StorageError::BucketAlreadyOwnedByYou { bucket })
                } else {
                    Err(StorageError::BucketAlreadyExists { bucket })
                }
            }
            dashmap::Entry::Vacant(slot) => {
                slot.insert(MemoryBucket {
                    owner: self.owner.clone(),
                    region: region.to_owned(),
                    objects: BTreeMap::new(),
                });
                debug!(bucket, region, owner = %self.owner, "in-memory bucket created");
                Ok(())
            }
        }
    }

    async fn list_object_keys(&self, bucket: &str) -> StorageResult<Vec<String>> {
        self.state.enter(StorageOperation::ListObjectKeys, bucket)?;
        self.state
            .buckets
            .get(bucket)
            .map(|b| b.objects.keys().cloned().collect())
            .ok_or_else(|| StorageError::NoSuchBucket {
                bucket: bucket.to_owned(),
            })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.state.enter(StorageOperation::DeleteObject, bucket)?;
        let mut entry =
            self.state
                .buckets
                .get_mut(bucket)
                .ok_or_else(|| StorageError::NoSuchBucket {
                    bucket: bucket.to_owned(),
                })?;
        // Deleting a missing key succeeds, as in S3.
        entry.objects.remove(key);
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.state.enter(StorageOperation::DeleteBucket, bucket)?;

        let removed = self
            .state
            .buckets
            .remove_if(bucket, |_, b| b.objects.is_empty());
        if removed.is_some() {
            debug!(bucket, "in-memory bucket deleted");
            return Ok(());
        }

        let bucket = bucket.to_owned();
        if self.state.buckets.contains_key(&bucket) {
            Err(StorageError::BucketNotEmpty { bucket })
        } else {
            Err(StorageError::NoSuchBucket { bucket })
        }
    }
}
