//! In-memory stores.
//!
//! They mimic the API server semantics the engine depends on:
//! resourceVersion-checked writes, status merges, deletion as a timestamp,
//! and purge once the last finalizer is gone.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{Resource, ResourceExt};
use quobject_model::{QuObjectBucketClaim, QuObjectBucketClaimStatus};
use tracing::debug;

use super::{ClaimKey, ClaimStore};
use crate::artifacts::{Artifact, ArtifactStore};
use crate::error::{Error, Result};

fn bump(meta: &mut kube::api::ObjectMeta) {
    let next = meta
        .resource_version
        .as_deref()
        .and_then(|rv| rv.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    meta.resource_version = Some(next.to_string());
}

fn check_version(stored: Option<&str>, incoming: Option<&str>, what: &str) -> Result<()> {
    match incoming {
        Some(rv) if Some(rv) != stored => Err(Error::Conflict(format!(
            "{what}: resourceVersion {rv} is stale"
        ))),
        _ => Ok(()),
    }
}

fn now() -> Result<Time> {
    let stamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    Ok(serde_json::from_value(serde_json::Value::String(stamp))?)
}

/// In-memory [`ClaimStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryClaimStore {
    claims: Arc<DashMap<ClaimKey, QuObjectBucketClaim>>,
    pending_conflicts: Arc<AtomicUsize>,
    metadata_writes: Arc<AtomicUsize>,
    status_writes: Arc<AtomicUsize>,
}

impl InMemoryClaimStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `claim` as a user would create it: a uid and resourceVersion are
    /// assigned, any status is kept.
    pub fn insert(&self, mut claim: QuObjectBucketClaim) -> Result<QuObjectBucketClaim> {
        let key = ClaimKey::of(&claim)?;
        if claim.metadata.uid.is_none() {
            claim.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        bump(&mut claim.metadata);
        self.claims.insert(key, claim.clone());
        Ok(claim)
    }

    /// Snapshot of a stored claim.
    #[must_use]
    pub fn claim(&self, key: &ClaimKey) -> Option<QuObjectBucketClaim> {
        self.claims.get(key).map(|c| c.clone())
    }

    /// Change a stored claim out of band, as a user or another controller would.
    pub fn edit(&self, key: &ClaimKey, edit: impl FnOnce(&mut QuObjectBucketClaim)) -> Result<()> {
        let mut entry = self
            .claims
            .get_mut(key)
            .ok_or_else(|| Error::Store(format!("claim {key} not found")))?;
        edit(&mut entry);
        bump(&mut entry.metadata);
        Ok(())
    }

    /// Request deletion: set the deletion timestamp, or purge right away when
    /// no finalizer holds the claim.
    pub fn request_deletion(&self, key: &ClaimKey) -> Result<()> {
        let timestamp = now()?;
        let purge = {
            let mut entry = self
                .claims
                .get_mut(key)
                .ok_or_else(|| Error::Store(format!("claim {key} not found")))?;
            if entry.metadata.deletion_timestamp.is_none() {
                entry.metadata.deletion_timestamp = Some(timestamp);
                bump(&mut entry.metadata);
            }
            entry.finalizers().is_empty()
        };
        if purge {
            self.claims.remove(key);
        }
        Ok(())
    }

    /// Fail the next `times` metadata writes with a conflict.
    pub fn inject_conflicts(&self, times: usize) {
        self.pending_conflicts.store(times, Ordering::SeqCst);
    }

    /// Metadata writes accepted so far.
    #[must_use]
    pub fn metadata_writes(&self) -> usize {
        self.metadata_writes.load(Ordering::SeqCst)
    }

    /// Status writes accepted so far.
    #[must_use]
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    fn take_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ClaimStore for InMemoryClaimStore {
    async fn get(&self, key: &ClaimKey) -> Result<Option<QuObjectBucketClaim>> {
        Ok(self.claim(key))
    }

    async fn update_metadata(&self, claim: &QuObjectBucketClaim) -> Result<QuObjectBucketClaim> {
        let key = ClaimKey::of(claim)?;
        if self.take_conflict() {
            return Err(Error::Conflict(format!("injected conflict on {key}")));
        }

        let (updated, purge) = {
            let mut entry = self
                .claims
                .get_mut(&key)
                .ok_or_else(|| Error::Store(format!("claim {key} not found")))?;
            check_version(
                entry.metadata.resource_version.as_deref(),
                claim.metadata.resource_version.as_deref(),
                &key.to_string(),
            )?;

            entry.metadata.finalizers.clone_from(&claim.metadata.finalizers);
            for (k, v) in claim.annotations() {
                entry.annotations_mut().insert(k.clone(), v.clone());
            }
            bump(&mut entry.metadata);
            let purge = entry.is_terminating() && entry.finalizers().is_empty();
            (entry.clone(), purge)
        };
        self.metadata_writes.fetch_add(1, Ordering::SeqCst);

        if purge {
            self.claims.remove(&key);
            debug!(claim = %key, "claim purged");
        }
        Ok(updated)
    }

    async fn patch_status(
        &self,
        key: &ClaimKey,
        status: &QuObjectBucketClaimStatus,
    ) -> Result<QuObjectBucketClaim> {
        let mut entry = self
            .claims
            .get_mut(key)
            .ok_or_else(|| Error::Store(format!("claim {key} not found")))?;

        let stored = entry.status.get_or_insert_with(Default::default);
        if status.phase.is_some() {
            stored.phase = status.phase;
        }
        if status.bucket_name.is_some() {
            stored.bucket_name.clone_from(&status.bucket_name);
        }
        if status.secret_ref.is_some() {
            stored.secret_ref.clone_from(&status.secret_ref);
        }
        if status.config_map_ref.is_some() {
            stored.config_map_ref.clone_from(&status.config_map_ref);
        }
        bump(&mut entry.metadata);
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(entry.clone())
    }
}

/// In-memory [`ArtifactStore`] keyed by namespace and name.
#[derive(Debug, Clone)]
pub struct InMemoryArtifactStore<A> {
    objects: Arc<DashMap<(String, String), A>>,
    pending_failures: Arc<AtomicUsize>,
}

impl<A> Default for InMemoryArtifactStore<A> {
    fn default() -> Self {
        Self {
            objects: Arc::new(DashMap::new()),
            pending_failures: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl<A: Artifact> InMemoryArtifactStore<A> {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a stored artifact.
    #[must_use]
    pub fn artifact(&self, namespace: &str, name: &str) -> Option<A> {
        self.objects
            .get(&(namespace.to_owned(), name.to_owned()))
            .map(|a| a.clone())
    }

    /// Number of stored artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Fail the next `times` writes (create or replace) with a store error.
    pub fn fail_next(&self, times: usize) {
        self.pending_failures.store(times, Ordering::SeqCst);
    }

    fn take_failure(&self) -> Result<()> {
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(Error::Store(format!("injected {} write failure", A::KIND)));
        }
        Ok(())
    }

    fn key_of(artifact: &A) -> Result<(String, String)> {
        let namespace = artifact
            .namespace()
            .ok_or(Error::MissingObjectKey("namespace"))?;
        Ok((namespace, artifact.name_any()))
    }
}

#[async_trait]
impl<A: Artifact> ArtifactStore<A> for InMemoryArtifactStore<A> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<A>> {
        Ok(self.artifact(namespace, name))
    }

    async fn create(&self, artifact: &A) -> Result<A> {
        self.take_failure()?;
        let key = Self::key_of(artifact)?;
        match self.objects.entry(key) {
            dashmap::Entry::Occupied(e) => Err(Error::Conflict(format!(
                "{} {}/{} already exists",
                A::KIND,
                e.key().0,
                e.key().1
            ))),
            dashmap::Entry::Vacant(slot) => {
                let mut stored = artifact.clone();
                stored.meta_mut().uid = Some(uuid::Uuid::new_v4().to_string());
                stored.meta_mut().resource_version = None;
                bump(stored.meta_mut());
                slot.insert(stored.clone());
                Ok(stored)
            }
        }
    }

    async fn replace(&self, artifact: &A) -> Result<A> {
        self.take_failure()?;
        let key = Self::key_of(artifact)?;
        let mut entry = self.objects.get_mut(&key).ok_or_else(|| {
            Error::Store(format!("{} {}/{} not found", A::KIND, key.0, key.1))
        })?;
        check_version(
            entry.meta().resource_version.as_deref(),
            artifact.meta().resource_version.as_deref(),
            A::KIND,
        )?;
        let mut stored = artifact.clone();
        stored.meta_mut().uid.clone_from(&entry.meta().uid);
        stored.meta_mut().resource_version = entry.meta().resource_version.clone();
        bump(stored.meta_mut());
        *entry = stored.clone();
        Ok(stored)
    }
}
