//! End-to-end engine tests: in-memory claim store, live S3 backend.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use k8s_openapi::api::core::v1::{ConfigMap, Secret};
    use quobject_core::config::ControllerConfig;
    use quobject_core::credentials::StaticCredentials;
    use quobject_core::naming::NameResolver;
    use quobject_core::store::ClaimKey;
    use quobject_core::store::memory::{InMemoryArtifactStore, InMemoryClaimStore};
    use quobject_core::{Context, reconcile};
    use quobject_model::{ClaimPhase, QuObjectBucketClaim, QuObjectBucketClaimSpec, RetainPolicy};
    use quobject_s3::AwsConnector;

    use crate::{
        bucket_exists, cleanup_bucket, connection_settings, put_objects, s3_client,
        test_bucket_name,
    };

    struct Setup {
        ctx: Arc<Context>,
        claims: InMemoryClaimStore,
    }

    fn setup() -> Setup {
        let config = ControllerConfig::default();
        let claims = InMemoryClaimStore::new();
        let ctx = Context::with_clients(
            Arc::new(claims.clone()),
            Arc::new(InMemoryArtifactStore::<Secret>::new()),
            Arc::new(InMemoryArtifactStore::<ConfigMap>::new()),
            Arc::new(StaticCredentials::new(connection_settings())),
            Arc::new(AwsConnector::new().with_operation_timeout(config.reconcile_timeout())),
            NameResolver::default(),
            config,
        );
        Setup {
            ctx: Arc::new(ctx),
            claims,
        }
    }

    impl Setup {
        fn create(&self, name: &str, spec: QuObjectBucketClaimSpec) -> ClaimKey {
            let mut claim = QuObjectBucketClaim::new(name, spec);
            claim.metadata.namespace = Some("integration".to_owned());
            self.claims
                .insert(claim)
                .unwrap_or_else(|e| panic!("insert failed: {e}"));
            ClaimKey::new("integration", name)
        }

        async fn pass(&self, key: &ClaimKey) {
            let claim = self
                .claims
                .claim(key)
                .unwrap_or_else(|| panic!("claim {key} missing"));
            reconcile(Arc::new(claim), Arc::clone(&self.ctx))
                .await
                .unwrap_or_else(|e| panic!("reconcile of {key} failed: {e}"));
        }
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_provision_and_delete_bucket() {
        let client = s3_client();
        let bucket = test_bucket_name("engine");
        let s = setup();
        let key = s.create(
            "delete-me",
            QuObjectBucketClaimSpec {
                bucket_name: Some(bucket.clone()),
                retain_policy: RetainPolicy::Delete,
                ..Default::default()
            },
        );

        s.pass(&key).await;
        let claim = s
            .claims
            .claim(&key)
            .unwrap_or_else(|| panic!("claim missing"));
        assert_eq!(claim.phase(), Some(ClaimPhase::Bound));
        assert!(bucket_exists(&client, &bucket).await);

        put_objects(&client, &bucket, 3).await;
        s.claims
            .request_deletion(&key)
            .unwrap_or_else(|e| panic!("delete failed: {e}"));
        s.pass(&key).await;

        assert!(!bucket_exists(&client, &bucket).await);
        assert!(s.claims.claim(&key).is_none());
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_retain_bucket_after_claim_deletion() {
        let client = s3_client();
        let s = setup();
        let key = s.create(
            "keep-me",
            QuObjectBucketClaimSpec {
                generate_bucket_name: Some("test-retain".to_owned()),
                ..Default::default()
            },
        );

        s.pass(&key).await;
        let bucket = s
            .claims
            .claim(&key)
            .and_then(|c| c.status_bucket_name().map(ToOwned::to_owned))
            .unwrap_or_else(|| panic!("bucket name not recorded"));

        s.claims
            .request_deletion(&key)
            .unwrap_or_else(|e| panic!("delete failed: {e}"));
        s.pass(&key).await;

        assert!(s.claims.claim(&key).is_none());
        assert!(bucket_exists(&client, &bucket).await);
        cleanup_bucket(&client, &bucket).await;
    }
}
