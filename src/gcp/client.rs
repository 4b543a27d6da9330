//! REST client for Pub/Sub v1 and the Cloud Storage JSON API v1

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{Notification, PubSubApi, StorageApi};
use crate::config::GcpConfig;
use crate::error::{OperatorError, Result};

/// Talks to the Google Cloud REST endpoints (or their emulators).
#[derive(Clone)]
pub struct GcpRestClient {
    http: reqwest::Client,
    pubsub_endpoint: String,
    storage_endpoint: String,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotificationList {
    #[serde(default)]
    items: Vec<Notification>,
}

impl GcpRestClient {
    pub fn new(config: &GcpConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("gcs-source-operator/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            pubsub_endpoint: config.pubsub_endpoint.trim_end_matches('/').to_string(),
            storage_endpoint: config.storage_endpoint.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }

    fn topic_url(&self, project: &str, topic: &str) -> String {
        format!(
            "{}/v1/projects/{}/topics/{}",
            self.pubsub_endpoint, project, topic
        )
    }

    fn notifications_url(&self, bucket: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/notificationConfigs",
            self.storage_endpoint, bucket
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify(status, what, &body))
    }
}

fn classify(status: StatusCode, what: &str, body: &str) -> OperatorError {
    match status {
        StatusCode::NOT_FOUND => OperatorError::NotFound(what.to_string()),
        StatusCode::CONFLICT => OperatorError::Conflict(format!("{what} already exists")),
        _ => OperatorError::Transport(format!("{what}: HTTP {status}: {}", body.trim())),
    }
}

#[async_trait]
impl PubSubApi for GcpRestClient {
    async fn topic_exists(&self, project: &str, topic: &str) -> Result<bool> {
        let url = self.topic_url(project, topic);
        let what = format!("topic projects/{project}/topics/{topic}");
        match self.send(self.request(Method::GET, &url), &what).await {
            Ok(_) => Ok(true),
            Err(OperatorError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_topic(&self, project: &str, topic: &str) -> Result<()> {
        let url = self.topic_url(project, topic);
        let what = format!("topic projects/{project}/topics/{topic}");
        let builder = self
            .request(Method::PUT, &url)
            .json(&serde_json::json!({}));
        self.send(builder, &what).await?;
        debug!(project = %project, topic = %topic, "Pub/Sub topic created");
        Ok(())
    }

    async fn delete_topic(&self, project: &str, topic: &str) -> Result<()> {
        let url = self.topic_url(project, topic);
        let what = format!("topic projects/{project}/topics/{topic}");
        self.send(self.request(Method::DELETE, &url), &what).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageApi for GcpRestClient {
    async fn list_notifications(&self, bucket: &str) -> Result<Vec<Notification>> {
        let url = self.notifications_url(bucket);
        let what = format!("notifications of bucket {bucket}");
        let response = self.send(self.request(Method::GET, &url), &what).await?;
        let list: NotificationList = response.json().await?;
        Ok(list.items)
    }

    async fn insert_notification(
        &self,
        bucket: &str,
        notification: &Notification,
    ) -> Result<Notification> {
        let url = self.notifications_url(bucket);
        let what = format!("notification on bucket {bucket}");
        let builder = self.request(Method::POST, &url).json(notification);
        let response = self.send(builder, &what).await?;
        Ok(response.json().await?)
    }

    async fn delete_notification(&self, bucket: &str, id: &str) -> Result<()> {
        let url = format!("{}/{}", self.notifications_url(bucket), id);
        let what = format!("notification {id} on bucket {bucket}");
        self.send(self.request(Method::DELETE, &url), &what).await?;
        Ok(())
    }
}
