//! Connection settings for an S3-compatible endpoint.
//!
//! Settings are never hard-coded: the controller reads them from a credential
//! Secret at the start of every reconcile pass.

use std::fmt;

use typed_builder::TypedBuilder;

use crate::error::{StorageError, StorageResult};

/// Region used when the credential Secret leaves it empty.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Everything needed to build a client for one backend.
///
/// # Examples
///
/// ```
/// use quobject_s3::ConnectionSettings;
///
/// let settings = ConnectionSettings::builder()
///     .endpoint("minio.storage:9000".into())
///     .access_key("AKIA".into())
///     .secret_key("secret".into())
///     .build();
/// assert_eq!(settings.endpoint_url(), "https://minio.storage:9000");
/// assert_eq!(settings.port(), 9000);
/// ```
#[derive(Clone, PartialEq, Eq, TypedBuilder)]
pub struct ConnectionSettings {
    /// Endpoint as configured, with or without a scheme.
    pub endpoint: String,

    /// Region the buckets are created in.
    #[builder(default = String::from(DEFAULT_REGION))]
    pub region: String,

    /// Access key ID.
    pub access_key: String,

    /// Secret access key.
    pub secret_key: String,

    /// Talk HTTPS (`true`) or plain HTTP (`false`).
    #[builder(default = true)]
    pub use_ssl: bool,

    /// Accept any server certificate. Only meaningful with `use_ssl`.
    #[builder(default = false)]
    pub insecure_skip_verify: bool,
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("use_ssl", &self.use_ssl)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .finish()
    }
}

impl ConnectionSettings {
    /// Reject settings that cannot possibly produce a working client.
    pub fn validate(&self) -> StorageResult<()> {
        if self.host().is_empty() {
            return Err(StorageError::InvalidSettings("endpoint is empty".to_owned()));
        }
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(StorageError::InvalidSettings(
                "access key and secret key are required".to_owned(),
            ));
        }
        Ok(())
    }

    /// Region, defaulting to `us-east-1` when unset.
    #[must_use]
    pub fn effective_region(&self) -> &str {
        if self.region.is_empty() {
            DEFAULT_REGION
        } else {
            &self.region
        }
    }

    /// `host[:port]` with any scheme and path removed.
    #[must_use]
    pub fn host(&self) -> &str {
        let endpoint = self.endpoint.trim();
        let without_scheme = endpoint
            .split_once("://")
            .map_or(endpoint, |(_, rest)| rest);
        without_scheme
            .split('/')
            .next()
            .unwrap_or_default()
    }

    /// Endpoint URL with the scheme dictated by `use_ssl`.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{scheme}://{}", self.host())
    }

    /// Explicit port from the endpoint, else the scheme default.
    #[must_use]
    pub fn port(&self) -> u16 {
        explicit_port(self.host()).unwrap_or(if self.use_ssl { 443 } else { 80 })
    }
}

/// Location constraint to send on create.
///
/// `us-east-1` is the implicit default region and must not be sent as a
/// constraint.
#[must_use]
pub fn location_constraint(region: &str) -> Option<&str> {
    (!region.is_empty() && region != DEFAULT_REGION).then_some(region)
}

fn explicit_port(host: &str) -> Option<u16> {
    let (head, port) = host.rsplit_once(':')?;
    // A bare IPv6 literal has colons but no port.
    if head.contains(':') && !head.ends_with(']') {
        return None;
    }
    port.parse().ok()
}
