//! The `QuObjectBucketClaim` custom resource.

use std::collections::BTreeMap;
use std::fmt;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    ANNOTATION_BUCKET_NAME, CONFIG_MAP_SUFFIX, FINALIZER, LifecycleState, SECRET_SUFFIX,
};

/// Desired state of a bucket claim.
///
/// `kube` generates the [`QuObjectBucketClaim`] wrapper (metadata + spec +
/// status) from this struct.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "quobject.io",
    version = "v1alpha1",
    kind = "QuObjectBucketClaim",
    plural = "quobjectbucketclaims",
    shortname = "qobc",
    namespaced,
    status = "QuObjectBucketClaimStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"BucketName","type":"string","jsonPath":".status.bucketName"}"#,
    printcolumn = r#"{"name":"RetainPolicy","type":"string","jsonPath":".spec.retainPolicy"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct QuObjectBucketClaimSpec {
    /// Exact bucket name. Takes precedence over everything else.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,

    /// Prefix for a generated bucket name (`{prefix}-{suffix}`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_bucket_name: Option<String>,

    /// Storage class tag, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// What happens to the bucket when the claim is deleted.
    #[serde(default)]
    pub retain_policy: RetainPolicy,

    /// Free-form configuration, passed through untouched.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_config: BTreeMap<String, String>,
}

/// Observed state of a bucket claim. Written only by the controller.
///
/// Every field is optional and skipped when absent, so a merge-write of a
/// partially filled status leaves the other stored fields alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuObjectBucketClaimStatus {
    /// Current phase of the claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ClaimPhase>,

    /// Name of the bucket bound to this claim. Never changes once set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,

    /// Name of the Secret holding bucket credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,

    /// Name of the ConfigMap holding bucket coordinates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_ref: Option<String>,
}

/// Retention policy for the backing bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum RetainPolicy {
    /// Keep the bucket when the claim goes away.
    #[default]
    Retain,
    /// Empty and delete the bucket when the claim goes away.
    Delete,
}

impl RetainPolicy {
    /// Wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retain => "Retain",
            Self::Delete => "Delete",
        }
    }
}

impl fmt::Display for RetainPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claim phase as reported in `status.phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ClaimPhase {
    /// Accepted, bucket not bound yet.
    Pending,
    /// Bucket exists and both artifacts are in place.
    Bound,
    /// The last pass failed; see the controller's events and logs.
    Error,
}

impl ClaimPhase {
    /// Wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Bound => "Bound",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for ClaimPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Treat `Some("")` the same as `None`.
fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

impl QuObjectBucketClaimSpec {
    /// The explicit bucket name, if one was given.
    #[must_use]
    pub fn explicit_bucket_name(&self) -> Option<&str> {
        non_empty(self.bucket_name.as_ref())
    }

    /// The generation prefix, if one was given.
    #[must_use]
    pub fn name_prefix(&self) -> Option<&str> {
        non_empty(self.generate_bucket_name.as_ref())
    }
}

impl QuObjectBucketClaim {
    /// Whether the store has been asked to delete this claim.
    #[must_use]
    pub fn is_terminating(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether the controller finalizer is present.
    #[must_use]
    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == FINALIZER)
    }

    /// Add the controller finalizer. Returns `false` if it was already there.
    pub fn add_finalizer(&mut self) -> bool {
        if self.has_finalizer() {
            return false;
        }
        self.finalizers_mut().push(FINALIZER.to_owned());
        true
    }

    /// Remove the controller finalizer. Returns `false` if it was not there.
    pub fn remove_finalizer(&mut self) -> bool {
        let finalizers = self.finalizers_mut();
        let before = finalizers.len();
        finalizers.retain(|f| f != FINALIZER);
        finalizers.len() != before
    }

    /// Retention policy declared in the spec.
    #[must_use]
    pub fn retain_policy(&self) -> RetainPolicy {
        self.spec.retain_policy
    }

    /// Current phase, if any.
    #[must_use]
    pub fn phase(&self) -> Option<ClaimPhase> {
        self.status.as_ref().and_then(|s| s.phase)
    }

    /// Bucket name recorded in the status by an earlier pass.
    #[must_use]
    pub fn status_bucket_name(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| non_empty(s.bucket_name.as_ref()))
    }

    /// Bucket name recorded in the annotations by an earlier pass.
    #[must_use]
    pub fn annotated_bucket_name(&self) -> Option<&str> {
        non_empty(self.annotations().get(ANNOTATION_BUCKET_NAME))
    }

    /// Bucket name to clean up on deletion: annotation first, then status.
    #[must_use]
    pub fn recorded_bucket_name(&self) -> Option<&str> {
        self.annotated_bucket_name()
            .or_else(|| self.status_bucket_name())
    }

    /// Name of the credentials Secret derived from this claim.
    #[must_use]
    pub fn secret_name(&self) -> String {
        format!("{}{SECRET_SUFFIX}", self.name_any())
    }

    /// Name of the configuration ConfigMap derived from this claim.
    #[must_use]
    pub fn config_map_name(&self) -> String {
        format!("{}{CONFIG_MAP_SUFFIX}", self.name_any())
    }

    /// Conceptual lifecycle state derived from metadata and status.
    #[must_use]
    pub fn lifecycle(&self) -> LifecycleState {
        LifecycleState::of(self)
    }
}
