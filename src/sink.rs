//! Sink resolution
//!
//! Turns a [`SinkReference`] into the URI events are delivered to. Literal
//! URIs are validated as-is; object references are looked up and must
//! expose an address in their status (`status.address.url`, or the older
//! `status.address.hostname`).

use async_trait::async_trait;
use kube::api::{Api, DynamicObject};
use kube::core::{ApiResource, GroupVersionKind};
use kube::Client;
use reqwest::Url;
use serde_json::Value;

use crate::crd::{SinkReference, SinkTarget};
use crate::error::{OperatorError, Result};

#[async_trait]
pub trait SinkResolver: Send + Sync {
    /// Resolve `reference` for a resource living in `namespace`.
    ///
    /// Every failure is reported as `ResolutionFailed`.
    async fn resolve(&self, reference: &SinkReference, namespace: &str) -> Result<String>;
}

/// Validate a literal sink URI.
pub fn parse_literal_uri(uri: &str) -> Result<String> {
    let url = Url::parse(uri)
        .map_err(|e| OperatorError::ResolutionFailed(format!("invalid sink uri {uri:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(OperatorError::ResolutionFailed(format!(
            "sink uri {uri:?} must be an absolute http(s) URL"
        )));
    }
    Ok(uri.to_string())
}

/// Read the addressable URI out of an object's status.
pub fn address_from_status(object: &Value) -> Option<String> {
    let address = object.get("status")?.get("address")?;
    if let Some(url) = address
        .get("url")
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())
    {
        return Some(url.to_string());
    }
    address
        .get("hostname")
        .and_then(Value::as_str)
        .filter(|h| !h.is_empty())
        .map(|hostname| format!("http://{hostname}/"))
}

fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// [`SinkResolver`] that reads addressable objects through the dynamic API
pub struct KubeSinkResolver {
    client: Client,
}

impl KubeSinkResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SinkResolver for KubeSinkResolver {
    async fn resolve(&self, reference: &SinkReference, namespace: &str) -> Result<String> {
        let (api_version, kind, name, target_namespace) = match reference.target()? {
            SinkTarget::Uri(uri) => return parse_literal_uri(uri),
            SinkTarget::Object {
                api_version,
                kind,
                name,
                namespace: target_namespace,
            } => (api_version, kind, name, target_namespace.unwrap_or(namespace)),
        };

        let (group, version) = split_api_version(api_version);
        let resource = ApiResource::from_gvk(&GroupVersionKind::gvk(group, version, kind));
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), target_namespace, &resource);

        let object = api.get(name).await.map_err(|e| {
            OperatorError::ResolutionFailed(format!(
                "failed to get {kind} {target_namespace}/{name}: {e}"
            ))
        })?;

        address_from_status(&object.data).ok_or_else(|| {
            OperatorError::ResolutionFailed(format!(
                "{kind} {target_namespace}/{name} does not expose status.address"
            ))
        })
    }
}
