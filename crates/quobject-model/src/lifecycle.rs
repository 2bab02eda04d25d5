//! Conceptual claim lifecycle, derived from metadata and status.

use std::fmt;

use crate::{ClaimPhase, QuObjectBucketClaim};

/// Where a claim sits in its lifecycle.
///
/// Nothing stores this value; it is recomputed from the finalizer, the
/// deletion timestamp and `status.phase` every time it is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Never seen by the controller: no finalizer yet.
    New,
    /// Finalizer attached, bucket not bound (phase `Pending`, `Error` or unset).
    Provisioning,
    /// Bucket and artifacts in place.
    Bound,
    /// Deletion requested, cleanup still pending.
    Terminating,
    /// Deletion requested and cleanup done; the store purges it.
    Removed,
}

impl LifecycleState {
    /// Compute the state of `claim`.
    #[must_use]
    pub fn of(claim: &QuObjectBucketClaim) -> Self {
        match (claim.is_terminating(), claim.has_finalizer()) {
            (true, true) => Self::Terminating,
            (true, false) => Self::Removed,
            (false, false) => Self::New,
            (false, true) => match claim.phase() {
                Some(ClaimPhase::Bound) => Self::Bound,
                Some(ClaimPhase::Pending | ClaimPhase::Error) | None => Self::Provisioning,
            },
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "New",
            Self::Provisioning => "Provisioning",
            Self::Bound => "Bound",
            Self::Terminating => "Terminating",
            Self::Removed => "Removed",
        };
        f.write_str(s)
    }
}
