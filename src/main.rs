//! GCS Source Kubernetes Operator
//!
//! Watches GCSSource resources and wires their buckets to event sinks.
//!
//! ## Usage
//!
//! ```bash
//! # Run the operator (requires kubeconfig)
//! gcs-source-operator
//!
//! # Against the Pub/Sub and Cloud Storage emulators
//! gcs-source-operator --pubsub-endpoint http://localhost:8085 \
//!     --storage-endpoint http://localhost:4443
//!
//! # Print the GCSSource CRD
//! gcs-source-operator --print-crd | kubectl apply -f -
//!
//! # Run with custom log level
//! RUST_LOG=debug gcs-source-operator
//! ```

use clap::Parser;
use gcs_source_operator::config::{DEFAULT_PUBSUB_ENDPOINT, DEFAULT_STORAGE_ENDPOINT};
use gcs_source_operator::leader_election::{self, LeaderElector, LeaseTiming};
use gcs_source_operator::{GcpConfig, GcsSource, GcsSourceController, OperatorConfig};
use kube::{Client, CustomResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// GCS Source Kubernetes Operator
#[derive(Parser, Debug)]
#[command(name = "gcs-source-operator")]
#[command(version, about = "Kubernetes operator wiring Cloud Storage notifications to event sinks")]
struct Args {
    /// Print the GCSSource CustomResourceDefinition as JSON and exit
    #[arg(long)]
    print_crd: bool,

    /// Enable leader election for HA deployments
    #[arg(long, env = "LEADER_ELECTION", default_value = "false")]
    leader_election: bool,

    /// Namespace for the leader election Lease (auto-detected if empty)
    #[arg(long, env = "LEADER_ELECTION_NAMESPACE", default_value = "")]
    leader_election_namespace: String,

    /// Namespace to watch (empty for all namespaces)
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "")]
    namespace: String,

    /// Base URL of the Pub/Sub API
    #[arg(long, env = "PUBSUB_ENDPOINT", default_value = DEFAULT_PUBSUB_ENDPOINT)]
    pubsub_endpoint: String,

    /// Base URL of the Cloud Storage API
    #[arg(long, env = "STORAGE_ENDPOINT", default_value = DEFAULT_STORAGE_ENDPOINT)]
    storage_endpoint: String,

    /// OAuth2 bearer token for the Google Cloud APIs
    #[arg(long, env = "GCP_ACCESS_TOKEN", hide_env_values = true)]
    gcp_access_token: Option<String>,

    /// Timeout for a single Google Cloud API request, in seconds
    #[arg(long, env = "GCP_REQUEST_TIMEOUT_SECS", default_value = "30")]
    gcp_request_timeout_secs: u64,

    /// Deadline for one reconcile pass, in seconds
    #[arg(long, env = "RECONCILE_TIMEOUT_SECS", default_value = "60")]
    reconcile_timeout_secs: u64,

    /// Delay before a failed source is retried, in seconds
    #[arg(long, env = "ERROR_REQUEUE_SECS", default_value = "15")]
    error_requeue_secs: u64,

    /// Interval at which healthy sources are re-checked, in seconds
    #[arg(long, env = "RESYNC_SECS", default_value = "300")]
    resync_secs: u64,
}

impl Args {
    fn operator_config(&self) -> OperatorConfig {
        OperatorConfig {
            namespace: Some(self.namespace.clone()).filter(|ns| !ns.is_empty()),
            gcp: GcpConfig {
                pubsub_endpoint: self.pubsub_endpoint.clone(),
                storage_endpoint: self.storage_endpoint.clone(),
                access_token: self.gcp_access_token.clone().filter(|t| !t.is_empty()),
                request_timeout: Duration::from_secs(self.gcp_request_timeout_secs),
            },
            reconcile_timeout: Duration::from_secs(self.reconcile_timeout_secs),
            error_requeue: Duration::from_secs(self.error_requeue_secs),
            resync_interval: Duration::from_secs(self.resync_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_crd {
        println!("{}", serde_json::to_string_pretty(&GcsSource::crd())?);
        return Ok(());
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = args.operator_config();
    config.validate()?;

    info!("Starting GCS Source Kubernetes Operator");
    info!("Leader election: {}", args.leader_election);
    info!(
        "Watching namespace: {}",
        config.namespace.as_deref().unwrap_or("all")
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    // Acquire the lease before any reconciliation starts
    let elector = if args.leader_election {
        let ns = leader_election::detect_namespace(Some(&args.leader_election_namespace));
        info!("Leader election namespace: {}", ns);
        let elector = LeaderElector::new(client.clone(), &ns, LeaseTiming::default());
        elector.acquire().await?;
        Some(Arc::new(elector))
    } else {
        None
    };

    let controller = Arc::new(GcsSourceController::new(client.clone(), config));
    let controller_handle = tokio::spawn(async move {
        if let Err(e) = controller.run().await {
            error!("GCSSource controller error: {}", e);
        }
    });

    // Periodic lease renewal (no-op future when leader election is disabled)
    let elector_for_renew = elector.clone();
    let renew_handle = tokio::spawn(async move {
        match elector_for_renew {
            Some(e) => loop {
                tokio::time::sleep(e.renew_interval()).await;
                match e.renew().await {
                    Ok(true) => {}
                    Ok(false) => {
                        error!("Lost leader lease");
                        break;
                    }
                    Err(err) => {
                        error!("Failed to renew leader lease: {}", err);
                        break;
                    }
                }
            },
            None => std::future::pending::<()>().await,
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = controller_handle => {
            if let Err(e) = result {
                error!("GCSSource controller task failed: {}", e);
            }
        }
        _ = renew_handle => {
            error!("Leader lease lost, initiating shutdown");
        }
    }

    if let Some(e) = &elector {
        e.release().await;
    }

    info!("GCS Source Operator shutting down");
    Ok(())
}
