//! GCSSource Controller
//!
//! Converges a GCSSource onto three external objects: the Pub/Sub topic,
//! the relay forwarding that topic to the sink, and the bucket notification
//! publishing into the topic. Every pass is re-entrant; it resumes from
//! whatever the last pass managed to persist.

use futures::StreamExt;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::{Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{
    generate_topic_id, KubeRelayApi, NotificationAdapter, NotificationTarget, RelayAdapter,
    TopicAdapter,
};
use crate::config::OperatorConfig;
use crate::crd::{GcpPubSubSource, GcsSource};
use crate::error::{OperatorError, Result};
use crate::finalizers::{add_finalizer, remove_finalizer, FinalizerSet, FINALIZER_NAME};
use crate::gcp::GcpRestClient;
use crate::sink::{KubeSinkResolver, SinkResolver};
use crate::status::needs_update;
use crate::store::{KubeSourceStore, SourceLister, SourceStore};

/// The three external resource adapters a pass drives
pub struct Adapters {
    pub topics: TopicAdapter,
    pub notifications: NotificationAdapter,
    pub relays: RelayAdapter,
}

/// Reconciliation engine for GCSSource resources
pub struct GcsSourceReconciler {
    lister: Arc<dyn SourceLister>,
    store: Arc<dyn SourceStore>,
    resolver: Arc<dyn SinkResolver>,
    adapters: Adapters,
    reconcile_timeout: Duration,
    error_requeue: Duration,
    resync_interval: Duration,
}

impl GcsSourceReconciler {
    pub fn new(
        lister: Arc<dyn SourceLister>,
        store: Arc<dyn SourceStore>,
        resolver: Arc<dyn SinkResolver>,
        adapters: Adapters,
        config: &OperatorConfig,
    ) -> Self {
        Self {
            lister,
            store,
            resolver,
            adapters,
            reconcile_timeout: config.reconcile_timeout,
            error_requeue: config.error_requeue,
            resync_interval: config.resync_interval,
        }
    }

    /// Controller entry point
    pub async fn reconcile(&self, source: Arc<GcsSource>) -> Result<Action> {
        let name = source.name_any();
        let namespace = source.namespace().unwrap_or_else(|| "default".to_string());

        self.reconcile_key(&namespace, &name).await?;

        if source.is_terminating() {
            Ok(Action::await_change())
        } else {
            Ok(Action::requeue(self.resync_interval))
        }
    }

    pub fn error_policy(&self, source: &GcsSource, error: &OperatorError) -> Action {
        warn!(
            source = %source.name_any(),
            namespace = ?source.namespace(),
            "Reconciliation failed, retrying in {:?}: {}",
            self.error_requeue,
            error
        );
        Action::requeue(self.error_requeue)
    }

    /// Load the source, converge it, and persist the result if it changed.
    ///
    /// Whatever a failed pass managed to change is still persisted before the
    /// error is returned, so the next attempt starts from there. A pass that
    /// runs past its deadline persists nothing beyond its checkpoints.
    #[instrument(skip(self))]
    pub async fn reconcile_key(&self, namespace: &str, name: &str) -> Result<()> {
        if namespace.is_empty() || name.is_empty() {
            return Err(OperatorError::InvalidKey(format!("{namespace}/{name}")));
        }
        let Some(original) = self.lister.get_by_key(namespace, name) else {
            // Deleted since it was queued; nothing left to do.
            info!("GCSSource {}/{} in work queue no longer exists", namespace, name);
            return Ok(());
        };

        let mut persisted = (*original).clone();
        let mut candidate = persisted.clone();
        let result = match tokio::time::timeout(
            self.reconcile_timeout,
            self.converge(&mut candidate, &mut persisted),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!("Reconcile pass exceeded {:?}", self.reconcile_timeout);
                return Err(OperatorError::Timeout(self.reconcile_timeout));
            }
        };

        if needs_update(&persisted, &candidate) {
            if let Err(e) = self.store.update(&persisted, &candidate).await {
                warn!("Failed to update GCSSource status: {}", e);
                return Err(e);
            }
        } else {
            debug!("No status or finalizer change, skipping update");
        }

        result
    }

    /// Drive one convergence pass over `source`, mutating its status and
    /// finalizers in place.
    ///
    /// The topic reservation and the finalizer are written through the store
    /// as soon as they are set; the rest is left for the caller to persist.
    pub async fn reconcile_source(&self, source: &mut GcsSource) -> Result<()> {
        let mut persisted = source.clone();
        self.converge(source, &mut persisted).await
    }

    /// `persisted` tracks the stored object and moves forward with every
    /// checkpoint.
    async fn converge(&self, source: &mut GcsSource, persisted: &mut GcsSource) -> Result<()> {
        let namespace = source.namespace().unwrap_or_else(|| "default".to_string());

        let sink_uri = match self.resolve_sink(source, &namespace).await {
            Ok(uri) => {
                info!("Resolved sink URI to {:?}", uri);
                uri
            }
            Err(e) if source.is_terminating() => {
                info!("Couldn't resolve sink URI, continuing with deletion: {}", e);
                String::new()
            }
            Err(e) => {
                info!("Couldn't resolve sink URI: {}", e);
                return Err(e);
            }
        };

        if source.is_terminating() {
            return self.finalize(source).await;
        }

        // The topic name must be stored before the topic exists, or a lost
        // write leaves a topic nothing points at.
        if source.status_or_default().topic.is_empty() {
            source.status_mut().topic = generate_topic_id();
            self.checkpoint(source, persisted)
                .await
                .inspect_err(|e| info!("Failed to record topic reservation: {}", e))?;
        }
        let reserved = source.status_or_default().topic;
        let topic = self
            .adapters
            .topics
            .ensure(&source.spec.google_cloud_project, &reserved)
            .await
            .inspect_err(|e| info!("Failed to reconcile topic: {}", e))?;
        source.status_mut().topic = topic;

        if !FinalizerSet::from_meta(&source.metadata).contains(FINALIZER_NAME) {
            add_finalizer(&mut source.metadata, FINALIZER_NAME);
            self.checkpoint(source, persisted)
                .await
                .inspect_err(|e| info!("Failed to add finalizer: {}", e))?;
        }
        source.status_mut().sink_uri = sink_uri;

        let relay = self
            .adapters
            .relays
            .ensure(source)
            .await
            .inspect_err(|e| info!("Failed to reconcile relay: {}", e))?;
        debug!(
            relay = %relay.name_any(),
            relay_sink = ?relay.status.as_ref().and_then(|s| s.sink_uri.as_deref()),
            "Reconciled relay"
        );

        let status = source.status_or_default();
        let target = NotificationTarget {
            topic_project: &source.spec.google_cloud_project,
            topic_id: &status.topic,
            payload_format: source.spec.payload_format,
            event_types: &source.spec.event_types,
            object_name_prefix: source.spec.object_name_prefix.as_deref(),
            custom_attributes: &source.spec.custom_attributes,
        };
        let notification = self
            .adapters
            .notifications
            .ensure(&source.spec.bucket, &status.notification_id, &target)
            .await
            .inspect_err(|e| info!("Failed to reconcile bucket notification: {}", e))?;
        info!(notification = %notification.id, "Reconciled bucket notification");

        source.status_mut().notification_id = notification.id;
        Ok(())
    }

    /// Persist `source` now, before the pass creates anything that depends
    /// on it.
    async fn checkpoint(&self, source: &mut GcsSource, persisted: &mut GcsSource) -> Result<()> {
        let stored = self.store.update(persisted, source).await?;
        source.metadata.resource_version = stored.metadata.resource_version.clone();
        *persisted = stored;
        Ok(())
    }

    async fn resolve_sink(&self, source: &GcsSource, namespace: &str) -> Result<String> {
        let reference = source.spec.sink.as_ref().ok_or_else(|| {
            OperatorError::ResolutionFailed("spec.sink is not set".to_string())
        })?;
        self.resolver.resolve(reference, namespace).await
    }

    /// Terminating branch: tear down the notification and topic, then
    /// release the finalizer. The relay is owned by the source and left to
    /// garbage collection.
    async fn finalize(&self, source: &mut GcsSource) -> Result<()> {
        let status = source.status_or_default();

        self.adapters
            .notifications
            .delete(&source.spec.bucket, &status.notification_id)
            .await
            .inspect_err(|e| info!("Unable to delete the notification: {}", e))?;

        self.adapters
            .topics
            .delete(&source.spec.google_cloud_project, &status.topic)
            .await
            .inspect_err(|e| info!("Unable to delete the topic: {}", e))?;

        source.status_mut().topic.clear();
        remove_finalizer(&mut source.metadata, FINALIZER_NAME);
        Ok(())
    }
}

/// Runs the GCSSource reconciler under a kube-runtime controller
pub struct GcsSourceController {
    client: Client,
    config: OperatorConfig,
}

impl GcsSourceController {
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        Self { client, config }
    }

    /// Run the GCSSource controller until shutdown
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let (sources, relays): (Api<GcsSource>, Api<GcpPubSubSource>) =
            match self.config.namespace.as_deref() {
                Some(ns) => (
                    Api::namespaced(self.client.clone(), ns),
                    Api::namespaced(self.client.clone(), ns),
                ),
                None => (Api::all(self.client.clone()), Api::all(self.client.clone())),
            };
        let gcp = Arc::new(GcpRestClient::new(&self.config.gcp)?);

        info!("Starting GCSSource controller");

        // Relays carry a controller owner reference, so changes to them
        // requeue the owning source.
        let controller =
            Controller::new(sources, Config::default()).owns(relays, Config::default());

        let reconciler = Arc::new(GcsSourceReconciler::new(
            Arc::new(controller.store()),
            Arc::new(KubeSourceStore::new(self.client.clone())),
            Arc::new(KubeSinkResolver::new(self.client.clone())),
            Adapters {
                topics: TopicAdapter::new(gcp.clone()),
                notifications: NotificationAdapter::new(gcp),
                relays: RelayAdapter::new(Arc::new(KubeRelayApi::new(self.client.clone()))),
            },
            &self.config,
        ));

        controller
            .shutdown_on_signal()
            .run(
                |source, ctx| async move { ctx.reconcile(source).await },
                |source, error, ctx| ctx.error_policy(&source, error),
                reconciler,
            )
            .for_each(|result| async move {
                match result {
                    Ok((obj, _action)) => {
                        info!("Reconciled GCSSource: {}", obj.name);
                    }
                    Err(e) => {
                        error!("Reconciliation failed: {:?}", e);
                    }
                }
            })
            .await;

        Ok(())
    }
}
