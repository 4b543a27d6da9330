//! Runtime configuration shared by the controller and its adapters.
//!
//! Built by the binary from command-line flags and environment variables.

use reqwest::Url;
use std::time::Duration;

use crate::error::{OperatorError, Result};

pub const DEFAULT_PUBSUB_ENDPOINT: &str = "https://pubsub.googleapis.com";
pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";

/// Endpoints and credentials for the Google Cloud REST APIs
#[derive(Debug, Clone)]
pub struct GcpConfig {
    pub pubsub_endpoint: String,
    pub storage_endpoint: String,
    /// Pre-obtained OAuth2 bearer token. Requests are sent unauthenticated
    /// when unset, which is what the local emulators expect.
    pub access_token: Option<String>,
    pub request_timeout: Duration,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            pubsub_endpoint: DEFAULT_PUBSUB_ENDPOINT.to_string(),
            storage_endpoint: DEFAULT_STORAGE_ENDPOINT.to_string(),
            access_token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Operator-wide settings
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    pub gcp: GcpConfig,
    /// Deadline for a single reconcile pass
    pub reconcile_timeout: Duration,
    /// Delay before a failed key is redriven
    pub error_requeue: Duration,
    /// Periodic re-check of healthy sources, catching external drift
    pub resync_interval: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            gcp: GcpConfig::default(),
            reconcile_timeout: Duration::from_secs(60),
            error_requeue: Duration::from_secs(15),
            resync_interval: Duration::from_secs(300),
        }
    }
}

impl OperatorConfig {
    pub fn validate(&self) -> Result<()> {
        for (flag, endpoint) in [
            ("pubsub-endpoint", &self.gcp.pubsub_endpoint),
            ("storage-endpoint", &self.gcp.storage_endpoint),
        ] {
            let url = Url::parse(endpoint).map_err(|e| {
                OperatorError::Configuration(format!("invalid --{flag} {endpoint:?}: {e}"))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(OperatorError::Configuration(format!(
                    "--{flag} must be an http(s) URL, got {endpoint:?}"
                )));
            }
        }

        if self.reconcile_timeout.is_zero() {
            return Err(OperatorError::Configuration(
                "reconcile timeout must be greater than zero".to_string(),
            ));
        }
        if self.namespace.as_deref() == Some("") {
            return Err(OperatorError::Configuration(
                "namespace must be omitted rather than empty".to_string(),
            ));
        }
        Ok(())
    }
}
