//! Google Cloud Pub/Sub and Cloud Storage access
//!
//! The traits here are the raw operations the adapters build their
//! idempotent get-or-create and tolerant-delete logic on. A missing remote
//! object is always reported as [`OperatorError::NotFound`], never folded
//! into a transport error.
//!
//! [`OperatorError::NotFound`]: crate::error::OperatorError::NotFound

mod client;

pub use client::GcpRestClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[cfg(test)]
use mockall::automock;

use crate::error::Result;

/// Raw Pub/Sub topic operations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PubSubApi: Send + Sync {
    async fn topic_exists(&self, project: &str, topic: &str) -> Result<bool>;

    /// Fails with `Conflict` when the topic already exists.
    async fn create_topic(&self, project: &str, topic: &str) -> Result<()>;

    /// Fails with `NotFound` when the topic does not exist.
    async fn delete_topic(&self, project: &str, topic: &str) -> Result<()>;
}

/// Raw bucket notification operations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StorageApi: Send + Sync {
    async fn list_notifications(&self, bucket: &str) -> Result<Vec<Notification>>;

    async fn insert_notification(
        &self,
        bucket: &str,
        notification: &Notification,
    ) -> Result<Notification>;

    /// Fails with `NotFound` when the notification does not exist.
    async fn delete_notification(&self, bucket: &str, id: &str) -> Result<()>;
}

/// A bucket notification configuration, in the Cloud Storage JSON API shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Assigned by Cloud Storage on creation
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Full topic resource name
    pub topic: String,

    pub payload_format: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_types: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_name_prefix: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_attributes: BTreeMap<String, String>,
}

/// Topic resource name as Cloud Storage expects it in a notification.
pub fn topic_resource_name(project: &str, topic: &str) -> String {
    format!("//pubsub.googleapis.com/projects/{project}/topics/{topic}")
}
