//! Store implementations backed by the Kubernetes API.

use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use quobject_model::{QuObjectBucketClaim, QuObjectBucketClaimStatus};
use serde_json::json;

use super::{ClaimKey, ClaimStore};
use crate::artifacts::{Artifact, ArtifactStore};
use crate::error::{Error, Result};

/// Field manager recorded on every write.
pub const FIELD_MANAGER: &str = "quobject-controller";

/// [`ClaimStore`] over the API server.
#[derive(Clone)]
pub struct KubeClaimStore {
    client: Client,
}

impl fmt::Debug for KubeClaimStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeClaimStore").finish_non_exhaustive()
    }
}

impl KubeClaimStore {
    /// Store using `client`.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<QuObjectBucketClaim> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn patch_params() -> PatchParams {
    PatchParams {
        field_manager: Some(FIELD_MANAGER.to_owned()),
        ..PatchParams::default()
    }
}

#[async_trait]
impl ClaimStore for KubeClaimStore {
    async fn get(&self, key: &ClaimKey) -> Result<Option<QuObjectBucketClaim>> {
        Ok(self.api(&key.namespace).get_opt(&key.name).await?)
    }

    async fn update_metadata(&self, claim: &QuObjectBucketClaim) -> Result<QuObjectBucketClaim> {
        let key = ClaimKey::of(claim)?;
        // A JSON merge patch replaces the finalizer list wholesale and merges
        // annotations key by key. The resourceVersion makes it conditional.
        let patch = json!({
            "metadata": {
                "resourceVersion": claim.resource_version(),
                "finalizers": claim.finalizers(),
                "annotations": claim.annotations(),
            }
        });
        Ok(self
            .api(&key.namespace)
            .patch(&key.name, &patch_params(), &Patch::Merge(&patch))
            .await?)
    }

    async fn patch_status(
        &self,
        key: &ClaimKey,
        status: &QuObjectBucketClaimStatus,
    ) -> Result<QuObjectBucketClaim> {
        let patch = json!({ "status": status });
        Ok(self
            .api(&key.namespace)
            .patch_status(&key.name, &patch_params(), &Patch::Merge(&patch))
            .await?)
    }
}

/// [`ArtifactStore`] over the API server.
pub struct KubeArtifactStore<A> {
    client: Client,
    _kind: PhantomData<fn() -> A>,
}

impl<A> Clone for KubeArtifactStore<A> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            _kind: PhantomData,
        }
    }
}

impl<A: Artifact> fmt::Debug for KubeArtifactStore<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeArtifactStore")
            .field("kind", &A::KIND)
            .finish_non_exhaustive()
    }
}

impl<A> KubeArtifactStore<A> {
    /// Store using `client`.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<A: Artifact> KubeArtifactStore<A> {
    fn api_for(&self, artifact: &A) -> Result<(Api<A>, String)> {
        let namespace = artifact
            .namespace()
            .ok_or(Error::MissingObjectKey("namespace"))?;
        Ok((Api::namespaced(self.client.clone(), &namespace), artifact.name_any()))
    }
}

#[async_trait]
impl<A: Artifact> ArtifactStore<A> for KubeArtifactStore<A> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<A>> {
        let api: Api<A> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create(&self, artifact: &A) -> Result<A> {
        let (api, _) = self.api_for(artifact)?;
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_owned()),
            ..PostParams::default()
        };
        Ok(api.create(&params, artifact).await?)
    }

    async fn replace(&self, artifact: &A) -> Result<A> {
        let (api, name) = self.api_for(artifact)?;
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_owned()),
            ..PostParams::default()
        };
        Ok(api.replace(&name, &params, artifact).await?)
    }
}
