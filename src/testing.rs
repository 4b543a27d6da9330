//! In-memory stand-ins for the external systems, used by controller tests.
//!
//! Each fake records what was created so tests can assert on side effects,
//! and supports one-shot failure injection at every external call.

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::adapters::{NotificationAdapter, RelayAdapter, RelayApi, TopicAdapter};
use crate::config::OperatorConfig;
use crate::controllers::{Adapters, GcsSourceReconciler};
use crate::crd::{GcpPubSubSource, GcsSource, GcsSourceSpec, GcsSourceStatus, SinkReference};
use crate::error::{OperatorError, Result};
use crate::finalizers::FINALIZER_NAME;
use crate::gcp::{Notification, PubSubApi, StorageApi};
use crate::sink::SinkResolver;
use crate::status::{write_plan, WriteStep};
use crate::store::{SourceLister, SourceStore};

pub const SINK_URI: &str = "https://sink.example";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailPoint {
    Resolve,
    TopicExists,
    CreateTopic,
    DeleteTopic,
    ListNotifications,
    InsertNotification,
    DeleteNotification,
    GetRelay,
    CreateRelay,
}

#[derive(Debug, Default)]
pub struct CloudState {
    pub sink_uri: Option<String>,
    pub topics: BTreeSet<(String, String)>,
    pub notifications: BTreeMap<String, Vec<Notification>>,
    pub relays: BTreeMap<(String, String), GcpPubSubSource>,
    pub topic_creates: usize,
    pub notification_creates: usize,
    pub relay_creates: usize,
    pub next_notification_id: u64,
    pub failures: BTreeSet<FailPoint>,
    pub create_topic_delay: Option<Duration>,
}

/// Pub/Sub, Cloud Storage, relay API and sink resolver in one place
#[derive(Debug, Default)]
pub struct FakeCloud {
    pub state: Mutex<CloudState>,
}

impl FakeCloud {
    pub fn with_sink(uri: &str) -> Self {
        let cloud = Self::default();
        cloud.state.lock().unwrap().sink_uri = Some(uri.to_string());
        cloud
    }

    pub fn fail_once(&self, point: FailPoint) {
        self.state.lock().unwrap().failures.insert(point);
    }

    pub fn add_topic(&self, project: &str, topic: &str) {
        let mut state = self.state.lock().unwrap();
        state.topics.insert((project.to_string(), topic.to_string()));
    }

    pub fn add_notification(&self, bucket: &str, id: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .notifications
            .entry(bucket.to_string())
            .or_default()
            .push(Notification {
                id: id.to_string(),
                ..Default::default()
            });
    }

    pub fn topic_count(&self) -> usize {
        self.state.lock().unwrap().topics.len()
    }

    pub fn notification_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .notifications
            .values()
            .map(Vec::len)
            .sum()
    }

    fn trip(&self, point: FailPoint) -> Result<()> {
        if self.state.lock().unwrap().failures.remove(&point) {
            return Err(OperatorError::Transport(format!(
                "injected failure at {point:?}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PubSubApi for FakeCloud {
    async fn topic_exists(&self, project: &str, topic: &str) -> Result<bool> {
        self.trip(FailPoint::TopicExists)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .topics
            .contains(&(project.to_string(), topic.to_string())))
    }

    async fn create_topic(&self, project: &str, topic: &str) -> Result<()> {
        let delay = self.state.lock().unwrap().create_topic_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.trip(FailPoint::CreateTopic)?;
        let mut state = self.state.lock().unwrap();
        if !state.topics.insert((project.to_string(), topic.to_string())) {
            return Err(OperatorError::Conflict(topic.to_string()));
        }
        state.topic_creates += 1;
        Ok(())
    }

    async fn delete_topic(&self, project: &str, topic: &str) -> Result<()> {
        self.trip(FailPoint::DeleteTopic)?;
        let mut state = self.state.lock().unwrap();
        if state
            .topics
            .remove(&(project.to_string(), topic.to_string()))
        {
            Ok(())
        } else {
            Err(OperatorError::NotFound(topic.to_string()))
        }
    }
}

#[async_trait]
impl StorageApi for FakeCloud {
    async fn list_notifications(&self, bucket: &str) -> Result<Vec<Notification>> {
        self.trip(FailPoint::ListNotifications)?;
        let state = self.state.lock().unwrap();
        Ok(state.notifications.get(bucket).cloned().unwrap_or_default())
    }

    async fn insert_notification(
        &self,
        bucket: &str,
        notification: &Notification,
    ) -> Result<Notification> {
        self.trip(FailPoint::InsertNotification)?;
        let mut state = self.state.lock().unwrap();
        state.next_notification_id += 1;
        state.notification_creates += 1;
        let created = Notification {
            id: format!("n-{}", state.next_notification_id),
            ..notification.clone()
        };
        state
            .notifications
            .entry(bucket.to_string())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn delete_notification(&self, bucket: &str, id: &str) -> Result<()> {
        self.trip(FailPoint::DeleteNotification)?;
        let mut state = self.state.lock().unwrap();
        let existing = state.notifications.entry(bucket.to_string()).or_default();
        let before = existing.len();
        existing.retain(|n| n.id != id);
        if existing.len() == before {
            return Err(OperatorError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RelayApi for FakeCloud {
    async fn get_relay(&self, namespace: &str, name: &str) -> Result<Option<GcpPubSubSource>> {
        self.trip(FailPoint::GetRelay)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .relays
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_relay(
        &self,
        namespace: &str,
        relay: &GcpPubSubSource,
    ) -> Result<GcpPubSubSource> {
        self.trip(FailPoint::CreateRelay)?;
        let mut state = self.state.lock().unwrap();
        state.relay_creates += 1;
        state
            .relays
            .insert((namespace.to_string(), relay.name_any()), relay.clone());
        Ok(relay.clone())
    }
}

#[async_trait]
impl SinkResolver for FakeCloud {
    async fn resolve(&self, _reference: &SinkReference, _namespace: &str) -> Result<String> {
        self.trip(FailPoint::Resolve)?;
        self.state
            .lock()
            .unwrap()
            .sink_uri
            .clone()
            .ok_or_else(|| OperatorError::ResolutionFailed("sink not addressable".to_string()))
    }
}

/// The API server's copy of the sources
///
/// Applies updates step by step in [`write_plan`] order and enforces
/// `resourceVersion` like the API server does.
#[derive(Debug, Default)]
pub struct FakeStore {
    pub objects: Mutex<BTreeMap<(String, String), GcsSource>>,
    pub writes: Mutex<usize>,
    attempts: Mutex<usize>,
    /// Reject the update call with this number (1-based) as a conflict
    pub conflict_on_update: Mutex<Option<usize>>,
    /// Fail the next step of this kind, after earlier steps have landed
    pub fail_step: Mutex<Option<WriteStep>>,
}

impl FakeStore {
    pub fn insert(&self, source: GcsSource) {
        let key = (source.namespace().unwrap_or_default(), source.name_any());
        self.objects.lock().unwrap().insert(key, source);
    }

    pub fn get(&self, namespace: &str, name: &str) -> GcsSource {
        self.objects.lock().unwrap()[&(namespace.to_string(), name.to_string())].clone()
    }

    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }
}

impl SourceLister for FakeStore {
    fn get_by_key(&self, namespace: &str, name: &str) -> Option<Arc<GcsSource>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .map(Arc::new)
    }
}

#[async_trait]
impl SourceStore for FakeStore {
    async fn update(&self, original: &GcsSource, desired: &GcsSource) -> Result<GcsSource> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            *attempts += 1;
            *attempts
        };
        if *self.conflict_on_update.lock().unwrap() == Some(attempt) {
            return Err(OperatorError::Conflict("object has been modified".to_string()));
        }

        let key = (desired.namespace().unwrap_or_default(), desired.name_any());
        let mut objects = self.objects.lock().unwrap();
        let mut stored = match objects.get(&key) {
            Some(stored) if stored.metadata.resource_version != desired.metadata.resource_version => {
                return Err(OperatorError::Conflict("stale resourceVersion".to_string()));
            }
            Some(stored) => stored.clone(),
            None => original.clone(),
        };

        let plan = write_plan(original, desired);
        for step in &plan {
            {
                let mut fail = self.fail_step.lock().unwrap();
                if *fail == Some(*step) {
                    *fail = None;
                    return Err(OperatorError::KubeApi(format!("injected failure writing {step:?}")));
                }
            }
            match step {
                WriteStep::Finalizers => stored.metadata.finalizers = desired.metadata.finalizers.clone(),
                WriteStep::Status => stored.status = desired.status.clone(),
            }
            let version = stored
                .metadata
                .resource_version
                .as_deref()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            stored.metadata.resource_version = Some((version + 1).to_string());
            objects.insert(key.clone(), stored.clone());
        }

        if !plan.is_empty() {
            *self.writes.lock().unwrap() += 1;
        }
        Ok(stored)
    }
}

pub struct Harness {
    pub cloud: Arc<FakeCloud>,
    pub store: Arc<FakeStore>,
    pub reconciler: GcsSourceReconciler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(OperatorConfig::default())
    }

    pub fn with_config(config: OperatorConfig) -> Self {
        let cloud = Arc::new(FakeCloud::with_sink(SINK_URI));
        let store = Arc::new(FakeStore::default());
        let reconciler = GcsSourceReconciler::new(
            store.clone(),
            store.clone(),
            cloud.clone(),
            Adapters {
                topics: TopicAdapter::new(cloud.clone()),
                notifications: NotificationAdapter::new(cloud.clone()),
                relays: RelayAdapter::new(cloud.clone()),
            },
            &config,
        );
        Self {
            cloud,
            store,
            reconciler,
        }
    }
}

/// A fresh source in namespace `default` watching bucket `b1`.
pub fn sample_source() -> GcsSource {
    let mut spec: GcsSourceSpec = serde_json::from_str(r#"{"bucket": "b1"}"#).unwrap();
    spec.google_cloud_project = "p1".to_string();
    spec.event_types = vec!["OBJECT_FINALIZE".to_string()];
    spec.sink = Some(SinkReference {
        uri: Some(SINK_URI.to_string()),
        ..Default::default()
    });
    let mut source = GcsSource::new("photos", spec);
    source.metadata.namespace = Some("default".to_string());
    source.metadata.uid = Some("3f1c2a".to_string());
    source.metadata.resource_version = Some("1".to_string());
    source
}

/// `sample_source` marked for deletion with the given prior state.
pub fn terminating_source(topic: &str, notification_id: &str) -> GcsSource {
    let mut source = sample_source();
    source.metadata.deletion_timestamp = Some(Time(Utc::now()));
    source.metadata.finalizers = Some(vec![FINALIZER_NAME.to_string()]);
    source.status = Some(GcsSourceStatus {
        sink_uri: String::new(),
        topic: topic.to_string(),
        notification_id: notification_id.to_string(),
    });
    source
}
