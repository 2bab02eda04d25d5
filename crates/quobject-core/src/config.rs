//! Controller configuration.
//!
//! Provides [`ControllerConfig`]. Values are loaded from environment
//! variables; every field has a default so the controller starts with no
//! configuration at all.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Controller configuration.
///
/// # Examples
///
/// ```
/// use quobject_core::config::ControllerConfig;
///
/// let config = ControllerConfig::builder()
///     .credentials_secret("minio-credentials".to_owned())
///     .build();
/// assert_eq!(config.controller_namespace, "quobject-controller");
/// assert_eq!(config.reconcile_concurrency, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfig {
    /// Namespace holding the storage credential Secret.
    #[builder(default = String::from("quobject-controller"))]
    pub controller_namespace: String,

    /// Name of the storage credential Secret.
    #[builder(default = String::from("s3-credentials"))]
    pub credentials_secret: String,

    /// Watch claims in this namespace only. `None` watches all namespaces.
    #[builder(default)]
    pub watch_namespace: Option<String>,

    /// Maximum number of claims reconciled at the same time.
    #[builder(default = 4)]
    pub reconcile_concurrency: u16,

    /// Requeue delay after a successful pass, in seconds.
    #[builder(default = 300)]
    pub resync_interval_secs: u64,

    /// Requeue delay after a failed pass, in seconds.
    #[builder(default = 5)]
    pub error_requeue_secs: u64,

    /// Deadline for one reconcile pass and for each backend call, in seconds.
    #[builder(default = 60)]
    pub reconcile_timeout_secs: u64,

    /// Log filter used when `RUST_LOG` is not set.
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `CONTROLLER_NAMESPACE` | `quobject-controller` |
    /// | `CREDENTIALS_SECRET` | `s3-credentials` |
    /// | `WATCH_NAMESPACE` | *(all namespaces)* |
    /// | `RECONCILE_CONCURRENCY` | `4` |
    /// | `RESYNC_INTERVAL_SECS` | `300` |
    /// | `ERROR_REQUEUE_SECS` | `5` |
    /// | `RECONCILE_TIMEOUT_SECS` | `60` |
    /// | `LOG_LEVEL` | `info` |
    ///
    /// Unparseable numbers keep their default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`], reading variables through `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("CONTROLLER_NAMESPACE") {
            config.controller_namespace = v;
        }
        if let Some(v) = lookup("CREDENTIALS_SECRET") {
            config.credentials_secret = v;
        }
        if let Some(v) = lookup("WATCH_NAMESPACE") {
            config.watch_namespace = Some(v).filter(|ns| !ns.is_empty());
        }
        if let Some(n) = lookup("RECONCILE_CONCURRENCY").and_then(|v| v.parse().ok()) {
            config.reconcile_concurrency = n;
        }
        if let Some(n) = lookup("RESYNC_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            config.resync_interval_secs = n;
        }
        if let Some(n) = lookup("ERROR_REQUEUE_SECS").and_then(|v| v.parse().ok()) {
            config.error_requeue_secs = n;
        }
        if let Some(n) = lookup("RECONCILE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            config.reconcile_timeout_secs = n;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// Requeue delay after a successful pass.
    #[must_use]
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    /// Requeue delay after a failed pass.
    #[must_use]
    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }

    /// Deadline for one pass.
    #[must_use]
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
pub(crate) fn parse_bool(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_should_create_default_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.controller_namespace, "quobject-controller");
        assert_eq!(config.credentials_secret, "s3-credentials");
        assert_eq!(config.watch_namespace, None);
        assert_eq!(config.resync_interval(), Duration::from_secs(300));
        assert_eq!(config.error_requeue(), Duration::from_secs(5));
        assert_eq!(config.reconcile_timeout(), Duration::from_secs(60));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_should_read_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("CREDENTIALS_SECRET", "minio"),
            ("WATCH_NAMESPACE", "apps"),
            ("RECONCILE_CONCURRENCY", "16"),
            ("ERROR_REQUEUE_SECS", "not-a-number"),
            ("RECONCILE_TIMEOUT_SECS", "10"),
        ]
        .into_iter()
        .collect();

        let config = ControllerConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_owned()));
        assert_eq!(config.credentials_secret, "minio");
        assert_eq!(config.watch_namespace.as_deref(), Some("apps"));
        assert_eq!(config.reconcile_concurrency, 16);
        assert_eq!(config.error_requeue_secs, 5);
        assert_eq!(config.reconcile_timeout_secs, 10);
    }

    #[test]
    fn test_should_treat_empty_watch_namespace_as_all() {
        let config = ControllerConfig::from_lookup(|k| {
            (k == "WATCH_NAMESPACE").then(String::new)
        });
        assert_eq!(config.watch_namespace, None);
    }

    #[test]
    fn test_should_serialize_camel_case() {
        let json = serde_json::to_value(ControllerConfig::default())
            .unwrap_or_else(|e| panic!("serialize failed: {e}"));
        assert_eq!(json["credentialsSecret"], "s3-credentials");
        assert_eq!(json["reconcileConcurrency"], 4);
    }

    #[test]
    fn test_should_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("yes"));
        assert!(!parse_bool(""));
    }
}
