//! Access to persisted GCSSource objects
//!
//! Reads come from the controller's reflector cache through the read-only
//! [`SourceLister`]; writes go straight to the API server and carry the
//! snapshot's `resourceVersion`, so a write against a stale snapshot fails
//! with `Conflict` instead of clobbering newer state.

use async_trait::async_trait;
use kube::api::{Api, PostParams};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Client, ResourceExt};
use std::sync::Arc;
use tracing::debug;

use crate::crd::GcsSource;
use crate::error::Result;
use crate::status::{write_plan, WriteStep};

/// Read-only view of the watched sources
pub trait SourceLister: Send + Sync {
    fn get_by_key(&self, namespace: &str, name: &str) -> Option<Arc<GcsSource>>;
}

impl SourceLister for Store<GcsSource> {
    fn get_by_key(&self, namespace: &str, name: &str) -> Option<Arc<GcsSource>> {
        self.get(&ObjectRef::new(name).within(namespace))
    }
}

/// Write side of the persisted sources
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Persist the status and finalizers of `desired`, which was derived from
    /// `original`, and return the object as stored. Only the parts that
    /// differ are written, in [`write_plan`] order.
    async fn update(&self, original: &GcsSource, desired: &GcsSource) -> Result<GcsSource>;
}

/// [`SourceStore`] backed by the Kubernetes API
pub struct KubeSourceStore {
    client: Client,
}

impl KubeSourceStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceStore for KubeSourceStore {
    async fn update(&self, original: &GcsSource, desired: &GcsSource) -> Result<GcsSource> {
        let name = desired.name_any();
        let namespace = desired.namespace().unwrap_or_else(|| "default".to_string());
        let sources: Api<GcsSource> = Api::namespaced(self.client.clone(), &namespace);
        let mut stored = desired.clone();

        for step in write_plan(original, desired) {
            let mut body = desired.clone();
            body.metadata.resource_version = stored.resource_version();
            let updated = match step {
                WriteStep::Finalizers => {
                    let updated = sources.replace(&name, &PostParams::default(), &body).await?;
                    debug!(source = %name, namespace = %namespace, "Updated finalizers");
                    updated
                }
                WriteStep::Status => {
                    let updated = sources
                        .replace_status(&name, &PostParams::default(), serde_json::to_vec(&body)?)
                        .await?;
                    debug!(source = %name, namespace = %namespace, "Updated status");
                    updated
                }
            };
            stored = updated;
        }

        Ok(stored)
    }
}
