//! Resource types for the quobject bucket-claim controller.
//!
//! This crate defines the `QuObjectBucketClaim` custom resource (group
//! `quobject.io`, version `v1alpha1`), its spec and status, and the small set
//! of well-known names the controller stamps onto claims and the artifacts it
//! derives from them.
//!
//! # Lifecycle
//!
//! ```text
//! New ──add finalizer──> Provisioning ──bucket + artifacts──> Bound
//!  │                          │                                 │
//!  └──────────────────────────┴──────── deletion requested ─────┘
//!                                              │
//!                                              v
//!                         Terminating ──cleanup, drop finalizer──> Removed
//! ```

mod claim;
mod lifecycle;

pub use claim::{
    ClaimPhase, QuObjectBucketClaim, QuObjectBucketClaimSpec, QuObjectBucketClaimStatus,
    RetainPolicy,
};
pub use lifecycle::LifecycleState;

/// Finalizer that blocks removal of a claim until its cleanup has run.
pub const FINALIZER: &str = "quobject.io/finalizer";

/// Annotation recording the resolved bucket name for the deletion path.
pub const ANNOTATION_BUCKET_NAME: &str = "quobject.io/bucket-name";

/// Annotation recording the retention policy in force when the bucket was bound.
pub const ANNOTATION_RETAIN_POLICY: &str = "quobject.io/retain-policy";

/// Suffix of the credentials Secret derived from a claim.
pub const SECRET_SUFFIX: &str = "-bucket-secret";

/// Suffix of the configuration ConfigMap derived from a claim.
pub const CONFIG_MAP_SUFFIX: &str = "-bucket-config";

/// Value of `app.kubernetes.io/managed-by` on every derived artifact.
pub const MANAGED_BY: &str = "quobject-controller";
