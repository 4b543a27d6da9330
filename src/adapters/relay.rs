//! Relay Adapter
//!
//! Creates the GcpPubSubSource that forwards topic messages to the sink.
//! Relays are created once and never updated afterwards; spec changes made
//! after creation do not reach an existing relay.

use async_trait::async_trait;
use kube::api::{Api, PostParams};
use kube::{Client, Resource, ResourceExt};
use std::sync::Arc;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::crd::{GcpPubSubSource, GcpPubSubSourceSpec, GcsSource};
use crate::error::{OperatorError, Result};

/// Raw relay object operations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RelayApi: Send + Sync {
    async fn get_relay(&self, namespace: &str, name: &str) -> Result<Option<GcpPubSubSource>>;

    async fn create_relay(
        &self,
        namespace: &str,
        relay: &GcpPubSubSource,
    ) -> Result<GcpPubSubSource>;
}

/// [`RelayApi`] backed by the Kubernetes API
pub struct KubeRelayApi {
    client: Client,
}

impl KubeRelayApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RelayApi for KubeRelayApi {
    async fn get_relay(&self, namespace: &str, name: &str) -> Result<Option<GcpPubSubSource>> {
        let relays: Api<GcpPubSubSource> = Api::namespaced(self.client.clone(), namespace);
        Ok(relays.get_opt(name).await?)
    }

    async fn create_relay(
        &self,
        namespace: &str,
        relay: &GcpPubSubSource,
    ) -> Result<GcpPubSubSource> {
        let relays: Api<GcpPubSubSource> = Api::namespaced(self.client.clone(), namespace);
        Ok(relays.create(&PostParams::default(), relay).await?)
    }
}

/// Build the relay for a source whose topic has been ensured.
pub fn make_relay(source: &GcsSource) -> Result<GcpPubSubSource> {
    let topic = source
        .status
        .as_ref()
        .map(|s| s.topic.as_str())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            OperatorError::Reconciliation(format!(
                "relay for {} requested before its topic exists",
                source.name_any()
            ))
        })?;

    let mut relay = GcpPubSubSource::new(
        &source.name_any(),
        GcpPubSubSourceSpec {
            google_cloud_project: source.spec.google_cloud_project.clone(),
            topic: topic.to_string(),
            service_account_name: source.spec.service_account_name.clone(),
            sink: source.spec.sink.clone(),
        },
    );
    relay.metadata.namespace = source.namespace();
    relay.metadata.owner_references = source.controller_owner_ref(&()).map(|o| vec![o]);
    Ok(relay)
}

pub struct RelayAdapter {
    api: Arc<dyn RelayApi>,
}

impl RelayAdapter {
    pub fn new(api: Arc<dyn RelayApi>) -> Self {
        Self { api }
    }

    /// Return the relay named after `source`, creating it if absent.
    pub async fn ensure(&self, source: &GcsSource) -> Result<GcpPubSubSource> {
        let name = source.name_any();
        let namespace = source.namespace().unwrap_or_else(|| "default".to_string());

        if let Some(existing) = self.api.get_relay(&namespace, &name).await? {
            debug!(relay = %name, namespace = %namespace, "Found existing relay");
            return Ok(existing);
        }

        let relay = make_relay(source)?;
        info!(relay = %name, namespace = %namespace, topic = %relay.spec.topic, "Creating relay");
        self.api.create_relay(&namespace, &relay).await
    }
}
