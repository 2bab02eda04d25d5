//! Engine error types.

use std::time::Duration;

use quobject_s3::StorageError;

/// Error returned by a reconcile pass.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Kubernetes API failure other than a write conflict.
    #[error("kubernetes API error: {0}")]
    Kube(#[source] kube::Error),

    /// Non-Kubernetes claim or artifact store failure.
    #[error("store error: {0}")]
    Store(String),

    /// A write raced with a concurrent change. Retried with fresh state.
    #[error("conflicting write: {0}")]
    Conflict(String),

    /// The credential Secret is missing or incomplete.
    #[error("storage credentials unavailable: {0}")]
    Credentials(String),

    /// Object storage backend failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A claim lacks a field needed to address it or its artifacts.
    #[error("claim has no {0}")]
    MissingObjectKey(&'static str),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The pass did not finish within its deadline.
    #[error("reconcile pass timed out after {0:?}")]
    Timeout(Duration),
}

/// Convenience result type for the engine.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Whether the error is a stale-write conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 409 => Self::Conflict(ae.message.clone()),
            other => Self::Kube(other),
        }
    }
}
