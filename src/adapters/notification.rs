//! Notification Adapter
//!
//! Get-or-create and tolerant delete for the bucket notification that
//! publishes object changes into the topic.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::crd::PayloadFormat;
use crate::error::Result;
use crate::gcp::{topic_resource_name, Notification, StorageApi};

/// What a newly created notification should look like
#[derive(Debug, Clone)]
pub struct NotificationTarget<'a> {
    pub topic_project: &'a str,
    pub topic_id: &'a str,
    pub payload_format: PayloadFormat,
    pub event_types: &'a [String],
    pub object_name_prefix: Option<&'a str>,
    pub custom_attributes: &'a BTreeMap<String, String>,
}

impl NotificationTarget<'_> {
    fn to_notification(&self) -> Notification {
        Notification {
            id: String::new(),
            topic: topic_resource_name(self.topic_project, self.topic_id),
            payload_format: self.payload_format.as_str().to_string(),
            event_types: self.event_types.to_vec(),
            object_name_prefix: self
                .object_name_prefix
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            custom_attributes: self.custom_attributes.clone(),
        }
    }
}

pub struct NotificationAdapter {
    api: Arc<dyn StorageApi>,
}

impl NotificationAdapter {
    pub fn new(api: Arc<dyn StorageApi>) -> Self {
        Self { api }
    }

    /// Return the notification named by `existing_id` if the bucket still
    /// has it. Failing that, adopt a notification already publishing into
    /// the target topic, since its ID may never have been recorded. Only
    /// then create one bound to `target`.
    pub async fn ensure(
        &self,
        bucket: &str,
        existing_id: &str,
        target: &NotificationTarget<'_>,
    ) -> Result<Notification> {
        let notifications = self.api.list_notifications(bucket).await?;

        if !existing_id.is_empty() {
            if let Some(existing) = notifications.iter().find(|n| n.id == existing_id) {
                debug!(bucket = %bucket, notification = %existing.id, "Found existing notification");
                return Ok(existing.clone());
            }
        }

        let topic = topic_resource_name(target.topic_project, target.topic_id);
        if let Some(bound) = notifications.into_iter().find(|n| n.topic == topic) {
            info!(bucket = %bucket, notification = %bound.id, "Adopting notification bound to topic");
            return Ok(bound);
        }

        info!(bucket = %bucket, topic = %target.topic_id, "Creating notification");
        let created = self
            .api
            .insert_notification(bucket, &target.to_notification())
            .await?;
        info!(bucket = %bucket, notification = %created.id, "Created notification");
        Ok(created)
    }

    /// Delete the notification. Empty IDs and already-absent notifications
    /// are success.
    pub async fn delete(&self, bucket: &str, id: &str) -> Result<()> {
        if id.is_empty() {
            return Ok(());
        }
        match self.api.delete_notification(bucket, id).await {
            Ok(()) => {
                info!(bucket = %bucket, notification = %id, "Deleted notification");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(bucket = %bucket, notification = %id, "Notification already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
