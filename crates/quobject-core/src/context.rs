//! Shared reconcile context.

use std::sync::Arc;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::Client;
use quobject_s3::{AwsConnector, StorageConnector};

use crate::artifacts::ArtifactStore;
use crate::config::ControllerConfig;
use crate::credentials::{CredentialSource, SecretCredentials};
use crate::naming::NameResolver;
use crate::store::ClaimStore;
use crate::store::api::{KubeArtifactStore, KubeClaimStore};

/// Collaborators shared by every reconcile pass.
///
/// Holds no per-claim state; storage clients are built fresh on each pass from
/// the credentials loaded in that pass.
#[derive(Debug)]
pub struct Context {
    /// Claim reads and writes.
    pub claims: Arc<dyn ClaimStore>,
    /// Credentials Secrets.
    pub secrets: Arc<dyn ArtifactStore<Secret>>,
    /// Configuration ConfigMaps.
    pub config_maps: Arc<dyn ArtifactStore<ConfigMap>>,
    /// Storage credentials.
    pub credentials: Arc<dyn CredentialSource>,
    /// Builds storage clients.
    pub storage: Arc<dyn StorageConnector>,
    /// Bucket name resolution.
    pub names: NameResolver,
    /// Controller settings.
    pub config: ControllerConfig,
}

impl Context {
    /// Context talking to the cluster through `client`.
    #[must_use]
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        let credentials = SecretCredentials::new(
            client.clone(),
            &config.controller_namespace,
            &config.credentials_secret,
        );
        let storage = AwsConnector::new().with_operation_timeout(config.reconcile_timeout());
        Self {
            claims: Arc::new(KubeClaimStore::new(client.clone())),
            secrets: Arc::new(KubeArtifactStore::<Secret>::new(client.clone())),
            config_maps: Arc::new(KubeArtifactStore::<ConfigMap>::new(client)),
            credentials: Arc::new(credentials),
            storage: Arc::new(storage),
            names: NameResolver::default(),
            config,
        }
    }

    /// Context with custom collaborators.
    ///
    /// This is primarily used for testing with in-memory stores.
    #[must_use]
    pub fn with_clients(
        claims: Arc<dyn ClaimStore>,
        secrets: Arc<dyn ArtifactStore<Secret>>,
        config_maps: Arc<dyn ArtifactStore<ConfigMap>>,
        credentials: Arc<dyn CredentialSource>,
        storage: Arc<dyn StorageConnector>,
        names: NameResolver,
        config: ControllerConfig,
    ) -> Self {
        Self {
            claims,
            secrets,
            config_maps,
            credentials,
            storage,
            names,
            config,
        }
    }
}
