//! Credential and configuration artifacts derived from a claim.
//!
//! Every bound claim owns a Secret (`{claim}-bucket-secret`) and a ConfigMap
//! (`{claim}-bucket-config`). Both carry a controller owner reference to the
//! claim, so the API server garbage-collects them when the claim is removed.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::{ByteString, NamespaceResourceScope};
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use quobject_model::{MANAGED_BY, QuObjectBucketClaim};
use quobject_s3::ConnectionSettings;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};

/// Label stamped on every artifact.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Secret keys.
pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
/// Secret key holding the secret access key.
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
/// Bucket name, in both artifacts.
pub const BUCKET_NAME: &str = "BUCKET_NAME";
/// Endpoint host, in both artifacts.
pub const BUCKET_HOST: &str = "BUCKET_HOST";
/// Bucket region, in both artifacts.
pub const BUCKET_REGION: &str = "BUCKET_REGION";
/// Endpoint port, ConfigMap only.
pub const BUCKET_PORT: &str = "BUCKET_PORT";

/// A namespaced object the controller derives from a claim.
pub trait Artifact:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Kind name for logs and errors.
    const KIND: &'static str;

    /// Copy the payload of `desired` over `self`, leaving metadata alone.
    fn overwrite_payload(&mut self, desired: &Self);
}

impl Artifact for Secret {
    const KIND: &'static str = "Secret";

    fn overwrite_payload(&mut self, desired: &Self) {
        self.data.clone_from(&desired.data);
        self.string_data.clone_from(&desired.string_data);
        self.type_.clone_from(&desired.type_);
    }
}

impl Artifact for ConfigMap {
    const KIND: &'static str = "ConfigMap";

    fn overwrite_payload(&mut self, desired: &Self) {
        self.data.clone_from(&desired.data);
        self.binary_data.clone_from(&desired.binary_data);
    }
}

/// Read and write access to one kind of artifact.
#[async_trait]
pub trait ArtifactStore<A: Artifact>: Send + Sync + fmt::Debug {
    /// Fetch `namespace/name`, `None` if absent.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<A>>;

    /// Create a new artifact.
    async fn create(&self, artifact: &A) -> Result<A>;

    /// Replace an existing artifact. `artifact` carries the stored identity.
    async fn replace(&self, artifact: &A) -> Result<A>;
}

/// Create `desired`, or overwrite the payload of the stored copy.
///
/// Every call re-asserts the full payload, so out-of-band edits are undone on
/// the next pass.
pub async fn upsert<A: Artifact>(store: &dyn ArtifactStore<A>, desired: A) -> Result<A> {
    let namespace = desired
        .meta()
        .namespace
        .clone()
        .ok_or(Error::MissingObjectKey("namespace"))?;
    let name = desired.name_any();

    match store.get(&namespace, &name).await? {
        None => {
            let created = store.create(&desired).await?;
            debug!(kind = A::KIND, %namespace, %name, "artifact created");
            Ok(created)
        }
        Some(mut existing) => {
            existing.overwrite_payload(&desired);
            let replaced = store.replace(&existing).await?;
            debug!(kind = A::KIND, %namespace, %name, "artifact updated");
            Ok(replaced)
        }
    }
}

/// Point the artifact's controller owner reference at `claim`.
pub fn stamp_owner<A: Artifact>(artifact: &mut A, claim: &QuObjectBucketClaim) -> Result<()> {
    let owner = claim
        .controller_owner_ref(&())
        .ok_or(Error::MissingObjectKey("uid"))?;
    artifact.meta_mut().owner_references = Some(vec![owner]);
    Ok(())
}

fn artifact_meta(claim: &QuObjectBucketClaim, name: String) -> Result<ObjectMeta> {
    let namespace = claim.namespace().ok_or(Error::MissingObjectKey("namespace"))?;
    Ok(ObjectMeta {
        name: Some(name),
        namespace: Some(namespace),
        labels: Some(BTreeMap::from([(
            MANAGED_BY_LABEL.to_owned(),
            MANAGED_BY.to_owned(),
        )])),
        ..ObjectMeta::default()
    })
}

/// Desired credentials Secret for `claim`, owner reference included.
pub fn render_secret(
    claim: &QuObjectBucketClaim,
    settings: &ConnectionSettings,
    bucket: &str,
) -> Result<Secret> {
    let data = [
        (AWS_ACCESS_KEY_ID, settings.access_key.as_str()),
        (AWS_SECRET_ACCESS_KEY, settings.secret_key.as_str()),
        (BUCKET_NAME, bucket),
        (BUCKET_HOST, settings.endpoint.as_str()),
        (BUCKET_REGION, settings.effective_region()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), ByteString(v.as_bytes().to_vec())))
    .collect();

    let mut secret = Secret {
        metadata: artifact_meta(claim, claim.secret_name())?,
        type_: Some("Opaque".to_owned()),
        data: Some(data),
        ..Secret::default()
    };
    stamp_owner(&mut secret, claim)?;
    Ok(secret)
}

/// Desired configuration ConfigMap for `claim`, owner reference included.
pub fn render_config_map(
    claim: &QuObjectBucketClaim,
    settings: &ConnectionSettings,
    bucket: &str,
) -> Result<ConfigMap> {
    let data = [
        (BUCKET_NAME, bucket.to_owned()),
        (BUCKET_HOST, settings.endpoint.clone()),
        (BUCKET_REGION, settings.effective_region().to_owned()),
        (BUCKET_PORT, settings.port().to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v))
    .collect();

    let mut config_map = ConfigMap {
        metadata: artifact_meta(claim, claim.config_map_name())?,
        data: Some(data),
        ..ConfigMap::default()
    };
    stamp_owner(&mut config_map, claim)?;
    Ok(config_map)
}
