//! Custom Resource Definitions for the GCS source operator
//!
//! - GCSSource: a bucket whose change notifications feed an event sink
//! - GcpPubSubSource: the relay forwarding topic messages to that sink

mod gcs_source;
mod pubsub_source;

pub use gcs_source::{
    GcsSource, GcsSourceSpec, GcsSourceStatus, PayloadFormat, SinkReference,
    SinkTarget,
};
pub use pubsub_source::{GcpPubSubSource, GcpPubSubSourceSpec, GcpPubSubSourceStatus};
