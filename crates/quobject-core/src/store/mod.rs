//! Claim store seam.
//!
//! [`ClaimStore`] is the engine's view of the API server: read a claim, write
//! its metadata (finalizers, annotations) and write its status. Metadata and
//! status are separate writes so neither clobbers concurrent changes to the
//! other.

pub mod api;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use kube::ResourceExt;
use quobject_model::{QuObjectBucketClaim, QuObjectBucketClaimStatus};

use crate::error::{Error, Result};

/// Namespace-qualified claim identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClaimKey {
    /// Claim namespace.
    pub namespace: String,
    /// Claim name.
    pub name: String,
}

impl ClaimKey {
    /// Key for `namespace/name`.
    #[must_use]
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        }
    }

    /// Key of `claim`. Fails if the claim has no namespace or name.
    pub fn of(claim: &QuObjectBucketClaim) -> Result<Self> {
        let namespace = claim.namespace().ok_or(Error::MissingObjectKey("namespace"))?;
        let name = claim
            .metadata
            .name
            .clone()
            .ok_or(Error::MissingObjectKey("name"))?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for ClaimKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Read and write access to claims.
#[async_trait]
pub trait ClaimStore: Send + Sync + fmt::Debug {
    /// Current state of the claim, `None` once it has been removed.
    async fn get(&self, key: &ClaimKey) -> Result<Option<QuObjectBucketClaim>>;

    /// Write `claim`'s finalizers and annotations.
    ///
    /// The write is conditional on `claim`'s resourceVersion; a stale version
    /// fails with [`Error::Conflict`].
    async fn update_metadata(&self, claim: &QuObjectBucketClaim) -> Result<QuObjectBucketClaim>;

    /// Merge `status` into the stored status. Absent fields are left alone.
    async fn patch_status(
        &self,
        key: &ClaimKey,
        status: &QuObjectBucketClaimStatus,
    ) -> Result<QuObjectBucketClaim>;
}

#[cfg(test)]
mod tests {
    use quobject_model::QuObjectBucketClaimSpec;

    use super::*;

    #[test]
    fn test_should_build_key_from_claim() {
        let mut claim = QuObjectBucketClaim::new("a", QuObjectBucketClaimSpec::default());
        assert!(matches!(
            ClaimKey::of(&claim),
            Err(Error::MissingObjectKey("namespace"))
        ));

        claim.metadata.namespace = Some("ns".to_owned());
        let key = ClaimKey::of(&claim).unwrap_or_else(|e| panic!("key failed: {e}"));
        assert_eq!(key, ClaimKey::new("ns", "a"));
        assert_eq!(key.to_string(), "ns/a");
    }
}
