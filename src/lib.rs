//! GCS Source Kubernetes Operator
//!
//! Turns Cloud Storage bucket changes into events delivered to a sink.
//!
//! ## Custom Resources
//!
//! - `GCSSource`: a bucket, the sink its change events go to, and the
//!   filters applied to them
//! - `GcpPubSubSource`: the relay created for each `GCSSource`, forwarding
//!   its Pub/Sub topic to the sink
//!
//! For each `GCSSource` the controller ensures a Pub/Sub topic, a relay
//! consuming that topic, and a bucket notification publishing into it. On
//! deletion the notification and topic are removed before the finalizer is
//! released.
//!
//! ## Example
//!
//! ```yaml
//! apiVersion: sources.eventing.knative.dev/v1alpha1
//! kind: GCSSource
//! metadata:
//!   name: photos
//! spec:
//!   googleCloudProject: my-project
//!   bucket: my-photos
//!   eventTypes: [OBJECT_FINALIZE]
//!   sink:
//!     apiVersion: serving.knative.dev/v1
//!     kind: Service
//!     name: event-display
//! ```

pub mod adapters;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod finalizers;
pub mod gcp;
pub mod leader_election;
pub mod sink;
pub mod status;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{GcpConfig, OperatorConfig};
pub use controllers::{GcsSourceController, GcsSourceReconciler};
pub use crd::{
    GcpPubSubSource, GcpPubSubSourceSpec, GcsSource, GcsSourceSpec, GcsSourceStatus,
    PayloadFormat, SinkReference,
};
pub use error::{OperatorError, Result};
