//! Topic Adapter
//!
//! Get-or-create and tolerant delete for the Pub/Sub topic a bucket
//! publishes into.

use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{OperatorError, Result};
use crate::gcp::PubSubApi;

/// Prefix keeping generated topic IDs conformant (must start with a letter)
pub const TOPIC_PREFIX: &str = "gcs-";

/// Mint a new, globally unique topic ID.
pub fn generate_topic_id() -> String {
    format!("{TOPIC_PREFIX}{}", Uuid::new_v4())
}

pub struct TopicAdapter {
    api: Arc<dyn PubSubApi>,
}

impl TopicAdapter {
    pub fn new(api: Arc<dyn PubSubApi>) -> Self {
        Self { api }
    }

    /// Make sure the topic exists and return its ID.
    ///
    /// An existing ID is kept even when the remote topic is missing, so a
    /// retry after a failed create never mints a second name.
    pub async fn ensure(&self, project: &str, existing_id: &str) -> Result<String> {
        let topic = if existing_id.is_empty() {
            generate_topic_id()
        } else {
            if self.api.topic_exists(project, existing_id).await? {
                debug!(project = %project, topic = %existing_id, "Topic exists already");
                return Ok(existing_id.to_string());
            }
            existing_id.to_string()
        };

        info!(project = %project, topic = %topic, "Creating topic");
        match self.api.create_topic(project, &topic).await {
            Ok(()) => info!(project = %project, topic = %topic, "Created topic"),
            // Lost a race with an earlier attempt that did get through.
            Err(OperatorError::Conflict(_)) => {
                debug!(project = %project, topic = %topic, "Topic appeared concurrently")
            }
            Err(e) => return Err(e),
        }
        Ok(topic)
    }

    /// Delete the topic. Empty IDs and already-absent topics are success.
    pub async fn delete(&self, project: &str, id: &str) -> Result<()> {
        if id.is_empty() {
            return Ok(());
        }
        match self.api.delete_topic(project, id).await {
            Ok(()) => {
                info!(project = %project, topic = %id, "Deleted topic");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(project = %project, topic = %id, "Topic already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
