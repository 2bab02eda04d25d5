//! QuObjectBucketClaim reconciliation.
//!
//! One pass per change notification. A pass re-reads the claim and dispatches
//! on its [`LifecycleState`]: `Terminating` runs the deletion sequence,
//! `Removed` waits for the purge, anything else runs the steady-state
//! sequence:
//!
//! 1. add the finalizer, before any external work
//! 2. load credentials
//! 3. resolve the bucket name and record it in annotations and status
//! 4. ensure the bucket
//! 5. upsert the credentials Secret and configuration ConfigMap
//! 6. mark the claim `Bound`
//!
//! Every step tolerates re-execution. Nothing retries inside a pass; failed
//! passes are re-delivered through [`error_policy`].
//!
//! The configured deadline bounds the steady-state sequence as a whole and
//! the backend part of the deletion sequence. A stalled backend can delay
//! finalizer removal by one deadline, never block it.

use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;
use kube::runtime::controller::Action;
use quobject_model::{
    ANNOTATION_BUCKET_NAME, ANNOTATION_RETAIN_POLICY, ClaimPhase, LifecycleState,
    QuObjectBucketClaim, QuObjectBucketClaimStatus, RetainPolicy,
};
use quobject_s3::{ConnectionSettings, empty_and_delete_bucket, ensure_bucket};
use tracing::{debug, error, info, instrument, warn};

use crate::artifacts::{render_config_map, render_secret, upsert};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::store::ClaimKey;

/// Requeue delay after a write conflict.
pub const CONFLICT_REQUEUE: Duration = Duration::from_millis(500);

/// Reconcile one claim.
///
/// A steady-state pass is abandoned with [`Error::Timeout`] once the
/// configured deadline elapses. Writes already persisted stay persisted; the
/// next pass resumes from them.
#[instrument(
    skip(claim, ctx),
    fields(claim = %claim.name_any(), namespace = %claim.namespace().unwrap_or_default())
)]
pub async fn reconcile(claim: Arc<QuObjectBucketClaim>, ctx: Arc<Context>) -> Result<Action> {
    reconcile_claim(&claim, &ctx).await
}

/// Decide when to retry a failed pass.
pub fn error_policy(claim: Arc<QuObjectBucketClaim>, error: &Error, ctx: Arc<Context>) -> Action {
    if error.is_conflict() {
        debug!(claim = %claim.name_any(), %error, "write conflict, retrying with fresh state");
        return Action::requeue(CONFLICT_REQUEUE);
    }
    error!(
        claim = %claim.name_any(),
        namespace = %claim.namespace().unwrap_or_default(),
        %error,
        "reconciliation failed"
    );
    Action::requeue(ctx.config.error_requeue())
}

async fn reconcile_claim(claim: &QuObjectBucketClaim, ctx: &Context) -> Result<Action> {
    let key = ClaimKey::of(claim)?;

    // The notification may carry a cached copy; act on the stored one.
    let Some(current) = ctx.claims.get(&key).await? else {
        debug!("claim no longer exists");
        return Ok(Action::await_change());
    };

    let state = current.lifecycle();
    debug!(%state, "claim observed");
    match state {
        LifecycleState::Removed => Ok(Action::await_change()),
        LifecycleState::Terminating => {
            finalize(current, ctx).await?;
            Ok(Action::await_change())
        }
        LifecycleState::New | LifecycleState::Provisioning | LifecycleState::Bound => {
            let deadline = ctx.config.reconcile_timeout();
            match tokio::time::timeout(deadline, converge(&key, current, ctx)).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(?deadline, "reconcile pass timed out");
                    return Err(Error::Timeout(deadline));
                }
            }
            Ok(Action::requeue(ctx.config.resync_interval()))
        }
    }
}

async fn converge(key: &ClaimKey, mut claim: QuObjectBucketClaim, ctx: &Context) -> Result<()> {
    if claim.lifecycle() == LifecycleState::New {
        claim.add_finalizer();
        claim = ctx.claims.update_metadata(&claim).await?;
        info!("finalizer added");
    }
    provision(key, claim, ctx).await
}

async fn provision(key: &ClaimKey, claim: QuObjectBucketClaim, ctx: &Context) -> Result<()> {
    let settings = match ctx.credentials.load().await {
        Ok(settings) => settings,
        Err(e) => return Err(mark_error(ctx, key, e).await),
    };

    let bucket = ctx.names.resolve(&claim);
    let claim = record_bucket_name(ctx, key, claim, &bucket).await?;

    let storage = match ctx.storage.connect(&settings) {
        Ok(storage) => storage,
        Err(e) => return Err(mark_error(ctx, key, e.into()).await),
    };
    if let Err(e) = ensure_bucket(storage.as_ref(), &bucket, settings.effective_region()).await {
        return Err(mark_error(ctx, key, e.into()).await);
    }

    let secret = upsert(ctx.secrets.as_ref(), render_secret(&claim, &settings, &bucket)?).await?;
    let config_map = upsert(
        ctx.config_maps.as_ref(),
        render_config_map(&claim, &settings, &bucket)?,
    )
    .await?;

    let status = QuObjectBucketClaimStatus {
        phase: Some(ClaimPhase::Bound),
        bucket_name: Some(bucket.clone()),
        secret_ref: Some(secret.name_any()),
        config_map_ref: Some(config_map.name_any()),
    };
    ctx.claims.patch_status(key, &status).await?;
    if claim.phase() != Some(ClaimPhase::Bound) {
        info!(%bucket, "claim bound");
    }
    Ok(())
}

/// Persist the resolved name before any backend work, so a later failure can
/// neither lose it nor cause a different suffix to be drawn.
async fn record_bucket_name(
    ctx: &Context,
    key: &ClaimKey,
    claim: QuObjectBucketClaim,
    bucket: &str,
) -> Result<QuObjectBucketClaim> {
    let policy = claim.retain_policy();
    let wanted = [
        (ANNOTATION_BUCKET_NAME, bucket),
        (ANNOTATION_RETAIN_POLICY, policy.as_str()),
    ];
    let stale = wanted
        .iter()
        .any(|(k, v)| claim.annotations().get(*k).map(String::as_str) != Some(*v));

    let mut claim = if stale {
        let mut annotated = claim;
        for (k, v) in wanted {
            annotated.annotations_mut().insert(k.to_owned(), v.to_owned());
        }
        ctx.claims.update_metadata(&annotated).await?
    } else {
        claim
    };

    if claim.status_bucket_name() != Some(bucket) {
        let status = QuObjectBucketClaimStatus {
            phase: claim.phase().is_none().then_some(ClaimPhase::Pending),
            bucket_name: Some(bucket.to_owned()),
            ..QuObjectBucketClaimStatus::default()
        };
        claim = ctx.claims.patch_status(key, &status).await?;
        debug!(%bucket, "bucket name recorded");
    }
    Ok(claim)
}

/// Set phase `Error` and hand back `err`. Other status fields are untouched.
async fn mark_error(ctx: &Context, key: &ClaimKey, err: Error) -> Error {
    let status = QuObjectBucketClaimStatus {
        phase: Some(ClaimPhase::Error),
        ..QuObjectBucketClaimStatus::default()
    };
    if let Err(status_err) = ctx.claims.patch_status(key, &status).await {
        warn!(error = %status_err, "failed to record error phase");
    }
    err
}

async fn finalize(mut claim: QuObjectBucketClaim, ctx: &Context) -> Result<()> {
    match claim.retain_policy() {
        RetainPolicy::Retain => info!("retain policy, leaving bucket in place"),
        RetainPolicy::Delete => match claim.recorded_bucket_name() {
            Some(bucket) => {
                let deadline = ctx.config.reconcile_timeout();
                if tokio::time::timeout(deadline, delete_bucket_best_effort(ctx, bucket))
                    .await
                    .is_err()
                {
                    warn!(%bucket, ?deadline, "bucket deletion timed out, leaving bucket behind");
                }
            }
            None => warn!("no bucket name recorded, nothing to delete"),
        },
    }

    claim.remove_finalizer();
    ctx.claims.update_metadata(&claim).await?;
    info!("finalizer removed");
    Ok(())
}

/// Failures are logged, never returned: a backend outage must not keep a
/// claim from being deleted.
async fn delete_bucket_best_effort(ctx: &Context, bucket: &str) {
    let settings: ConnectionSettings = match ctx.credentials.load().await {
        Ok(settings) => settings,
        Err(e) => {
            warn!(%bucket, error = %e, "cannot load credentials, leaving bucket behind");
            return;
        }
    };
    let storage = match ctx.storage.connect(&settings) {
        Ok(storage) => storage,
        Err(e) => {
            warn!(%bucket, error = %e, "cannot connect to storage, leaving bucket behind");
            return;
        }
    };
    match empty_and_delete_bucket(storage.as_ref(), bucket).await {
        Ok(()) => info!(%bucket, "bucket deleted"),
        Err(e) => warn!(%bucket, error = %e, "bucket deletion failed, leaving bucket behind"),
    }
}
