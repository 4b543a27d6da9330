//! Lease-based leader election.
//!
//! Reconciliation relies on at most one pass per source being in flight.
//! With several operator replicas that only holds if a single replica runs
//! the controller, so replicas compete for a `coordination.k8s.io/v1` Lease
//! and only the holder starts reconciling.

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, PostParams};
use kube::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const LEASE_NAME: &str = "gcs-source-operator-leader";

const SERVICE_ACCOUNT_NAMESPACE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Timing of the lease
#[derive(Debug, Clone)]
pub struct LeaseTiming {
    pub lease_duration: Duration,
    pub renew_interval: Duration,
    pub retry_interval: Duration,
}

impl Default for LeaseTiming {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(15),
            renew_interval: Duration::from_secs(10),
            retry_interval: Duration::from_secs(5),
        }
    }
}

/// Namespace holding the Lease: the explicit value, else the pod's own
/// namespace, else `default`.
pub fn detect_namespace(explicit: Option<&str>) -> String {
    if let Some(ns) = explicit.filter(|ns| !ns.is_empty()) {
        return ns.to_string();
    }
    std::fs::read_to_string(SERVICE_ACCOUNT_NAMESPACE)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "default".to_string())
}

fn detect_identity() -> String {
    std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("gcs-source-operator-{:08x}", rand::random::<u32>()))
}

/// What a replica should do with the lease it just read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// We hold it; refresh the renew time
    Renew,
    /// Nobody holds a live lease; take it over
    Takeover,
    /// Someone else holds a live lease
    Wait,
}

/// Decide how `identity` may claim a lease with the given spec at `now`.
pub fn evaluate_claim(
    spec: Option<&LeaseSpec>,
    identity: &str,
    now: DateTime<Utc>,
    default_duration: Duration,
) -> Claim {
    let holder = spec.and_then(|s| s.holder_identity.as_deref());
    if holder == Some(identity) {
        return Claim::Renew;
    }
    if holder.is_none() {
        return Claim::Takeover;
    }

    let duration_secs = spec
        .and_then(|s| s.lease_duration_seconds)
        .map(i64::from)
        .unwrap_or(default_duration.as_secs() as i64);
    match spec.and_then(|s| s.renew_time.as_ref()) {
        Some(MicroTime(renewed)) if now.signed_duration_since(*renewed).num_seconds() <= duration_secs => {
            Claim::Wait
        }
        _ => Claim::Takeover,
    }
}

/// The spec to write for a successful claim.
pub fn claimed_spec(
    previous: Option<&LeaseSpec>,
    identity: &str,
    now: DateTime<Utc>,
    lease_duration: Duration,
    takeover: bool,
) -> LeaseSpec {
    let transitions = previous.and_then(|s| s.lease_transitions).unwrap_or(0);
    LeaseSpec {
        holder_identity: Some(identity.to_string()),
        lease_duration_seconds: Some(lease_duration.as_secs() as i32),
        acquire_time: if takeover {
            Some(MicroTime(now))
        } else {
            previous.and_then(|s| s.acquire_time.clone())
        },
        renew_time: Some(MicroTime(now)),
        lease_transitions: Some(if takeover && previous.is_some() {
            transitions + 1
        } else {
            transitions
        }),
        ..Default::default()
    }
}

/// Competes for, holds and releases the operator's Lease.
pub struct LeaderElector {
    leases: Api<Lease>,
    identity: String,
    timing: LeaseTiming,
}

impl LeaderElector {
    pub fn new(client: Client, namespace: &str, timing: LeaseTiming) -> Self {
        let identity = detect_identity();
        info!(identity = %identity, namespace = %namespace, "Initialized leader elector");
        Self {
            leases: Api::namespaced(client, namespace),
            identity,
            timing,
        }
    }

    pub fn renew_interval(&self) -> Duration {
        self.timing.renew_interval
    }

    /// Block until this replica holds the lease.
    pub async fn acquire(&self) -> anyhow::Result<()> {
        info!(identity = %self.identity, "Waiting to acquire leader lease {}", LEASE_NAME);
        loop {
            match self.try_claim().await {
                Ok(true) => {
                    info!(identity = %self.identity, "Acquired leader lease");
                    return Ok(());
                }
                Ok(false) => debug!("Lease held by another replica"),
                Err(e) => warn!("Lease acquisition error: {}", e),
            }
            tokio::time::sleep(self.timing.retry_interval).await;
        }
    }

    /// Refresh the lease. `Ok(false)` means leadership was lost.
    pub async fn renew(&self) -> anyhow::Result<bool> {
        let lease = self.leases.get(LEASE_NAME).await?;
        let now = Utc::now();
        if evaluate_claim(
            lease.spec.as_ref(),
            &self.identity,
            now,
            self.timing.lease_duration,
        ) != Claim::Renew
        {
            return Ok(false);
        }
        self.write(&lease, now, false).await
    }

    /// Hand the lease back so a standby replica can take over immediately.
    pub async fn release(&self) {
        let mut lease = match self.leases.get(LEASE_NAME).await {
            Ok(lease) => lease,
            Err(e) => {
                warn!("Failed to read lease for release: {}", e);
                return;
            }
        };
        let Some(spec) = lease.spec.as_mut() else {
            return;
        };
        if spec.holder_identity.as_deref() != Some(self.identity.as_str()) {
            debug!("Lease not held by this replica, skipping release");
            return;
        }
        spec.holder_identity = None;

        match self
            .leases
            .replace(LEASE_NAME, &PostParams::default(), &lease)
            .await
        {
            Ok(_) => info!(identity = %self.identity, "Released leader lease"),
            Err(e) => warn!("Failed to release leader lease: {}", e),
        }
    }

    async fn try_claim(&self) -> anyhow::Result<bool> {
        let now = Utc::now();
        let existing = match self.leases.get_opt(LEASE_NAME).await? {
            Some(existing) => existing,
            None => return self.create(now).await,
        };

        match evaluate_claim(
            existing.spec.as_ref(),
            &self.identity,
            now,
            self.timing.lease_duration,
        ) {
            Claim::Renew => self.write(&existing, now, false).await,
            Claim::Takeover => self.write(&existing, now, true).await,
            Claim::Wait => Ok(false),
        }
    }

    async fn create(&self, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(LEASE_NAME.to_string()),
                ..Default::default()
            },
            spec: Some(claimed_spec(
                None,
                &self.identity,
                now,
                self.timing.lease_duration,
                true,
            )),
        };
        match self.leases.create(&PostParams::default(), &lease).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, existing: &Lease, now: DateTime<Utc>, takeover: bool) -> anyhow::Result<bool> {
        let mut updated = existing.clone();
        updated.spec = Some(claimed_spec(
            existing.spec.as_ref(),
            &self.identity,
            now,
            self.timing.lease_duration,
            takeover,
        ));
        // resourceVersion from `existing` makes a concurrent claim lose with 409.
        match self
            .leases
            .replace(LEASE_NAME, &PostParams::default(), &updated)
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                warn!("Lease conflict, another replica claimed it");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
