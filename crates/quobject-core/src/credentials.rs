//! Storage credentials.
//!
//! Credentials live in a single Secret with the keys `endpoint`, `region`,
//! `accessKey`, `secretKey` and, optionally, `useSSL` (default `true`) and
//! `insecureSkipVerify` (default `false`). They are read again on every
//! reconcile pass and never cached.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use parking_lot::RwLock;
use quobject_s3::ConnectionSettings;
use tracing::debug;

use crate::config::parse_bool;
use crate::error::{Error, Result};

/// Where reconcile passes get their [`ConnectionSettings`] from.
#[async_trait]
pub trait CredentialSource: Send + Sync + fmt::Debug {
    /// Load the current settings.
    async fn load(&self) -> Result<ConnectionSettings>;
}

/// Reads credentials from a Kubernetes Secret.
#[derive(Clone)]
pub struct SecretCredentials {
    api: Api<Secret>,
    namespace: String,
    name: String,
}

impl fmt::Debug for SecretCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCredentials")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl SecretCredentials {
    /// Source reading Secret `namespace/name`.
    #[must_use]
    pub fn new(client: Client, namespace: &str, name: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        }
    }
}

#[async_trait]
impl CredentialSource for SecretCredentials {
    async fn load(&self) -> Result<ConnectionSettings> {
        let secret = self.api.get_opt(&self.name).await?.ok_or_else(|| {
            Error::Credentials(format!("secret {}/{} not found", self.namespace, self.name))
        })?;
        let settings = settings_from_secret(&secret)?;
        debug!(endpoint = %settings.endpoint, region = %settings.effective_region(), "credentials loaded");
        Ok(settings)
    }
}

/// Fixed, swappable credentials. An empty source fails every load.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    settings: RwLock<Option<ConnectionSettings>>,
}

impl StaticCredentials {
    /// Source returning `settings`.
    #[must_use]
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            settings: RwLock::new(Some(settings)),
        }
    }

    /// Source that has no credentials.
    #[must_use]
    pub fn missing() -> Self {
        Self::default()
    }

    /// Replace the settings, as a credential rotation would.
    pub fn set(&self, settings: ConnectionSettings) {
        *self.settings.write() = Some(settings);
    }

    /// Drop the settings.
    pub fn clear(&self) {
        *self.settings.write() = None;
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn load(&self) -> Result<ConnectionSettings> {
        self.settings
            .read()
            .clone()
            .ok_or_else(|| Error::Credentials("no credentials configured".to_owned()))
    }
}

/// Parse a credential Secret.
///
/// `stringData` entries take precedence over `data`, matching what the API
/// server would store.
pub fn settings_from_secret(secret: &Secret) -> Result<ConnectionSettings> {
    let mut fields: BTreeMap<&str, String> = BTreeMap::new();
    for (key, ByteString(value)) in secret.data.iter().flatten() {
        let value = std::str::from_utf8(value)
            .map_err(|_| Error::Credentials(format!("key {key} is not valid UTF-8")))?;
        fields.insert(key, value.trim().to_owned());
    }
    for (key, value) in secret.string_data.iter().flatten() {
        fields.insert(key, value.trim().to_owned());
    }

    let required = |key: &str| -> Result<String> {
        match fields.get(key) {
            Some(value) if !value.is_empty() => Ok(value.clone()),
            _ => Err(Error::Credentials(format!("key {key} is missing or empty"))),
        }
    };

    let region = fields
        .get("region")
        .cloned()
        .ok_or_else(|| Error::Credentials("key region is missing".to_owned()))?;

    Ok(ConnectionSettings::builder()
        .endpoint(required("endpoint")?)
        .region(region)
        .access_key(required("accessKey")?)
        .secret_key(required("secretKey")?)
        .use_ssl(fields.get("useSSL").is_none_or(|v| parse_bool(v)))
        .insecure_skip_verify(fields.get("insecureSkipVerify").is_some_and(|v| parse_bool(v)))
        .build())
}
