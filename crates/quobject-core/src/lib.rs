//! Reconciliation engine for `QuObjectBucketClaim` resources.
//!
//! The engine turns a claim into a bucket on an S3-compatible backend plus two
//! derived artifacts (a credentials Secret and a configuration ConfigMap), and
//! tears the bucket down or retains it when the claim is deleted.
//!
//! # Architecture
//!
//! ```text
//! change notification
//!        |
//!        v
//! reconcile ──> ClaimStore (get, update_metadata, patch_status)
//!   |  |  |
//!   |  |  └──> NameResolver (spec > status > prefix-suffix > ns-name-suffix)
//!   |  └─────> CredentialSource ──> StorageConnector ──> ensure_bucket / empty_and_delete_bucket
//!   └────────> ArtifactStore<Secret>, ArtifactStore<ConfigMap> (upsert)
//! ```
//!
//! Every collaborator sits behind a trait held by [`Context`], with a
//! Kubernetes-backed implementation for the controller binary and an
//! in-memory one for tests.

pub mod artifacts;
pub mod config;
mod context;
pub mod credentials;
pub mod error;
pub mod naming;
mod reconcile;
pub mod store;

pub use context::Context;
pub use error::{Error, Result};
pub use reconcile::{CONFLICT_REQUEUE, error_policy, reconcile};
