//! GcpPubSubSource Custom Resource Definition
//!
//! The relay: consumes a Pub/Sub topic and forwards each message to a sink.
//! This operator only creates these objects; another controller runs them.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::SinkReference;

/// GcpPubSubSource is the Schema for the gcppubsubsources API
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "sources.eventing.knative.dev",
    version = "v1alpha1",
    kind = "GcpPubSubSource",
    namespaced,
    status = "GcpPubSubSourceStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct GcpPubSubSourceSpec {
    /// Project that owns the topic
    pub google_cloud_project: String,

    /// Topic to consume from
    pub topic: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink: Option<SinkReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GcpPubSubSourceStatus {
    /// Sink URI the relay resolved for itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink_uri: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_spec_serialization() {
        let spec = GcpPubSubSourceSpec {
            google_cloud_project: "p".to_string(),
            topic: "gcs-1".to_string(),
            service_account_name: None,
            sink: Some(SinkReference {
                uri: Some("https://sink.example".to_string()),
                ..Default::default()
            }),
        };
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["googleCloudProject"], "p");
        assert_eq!(value["topic"], "gcs-1");
        assert_eq!(value["sink"]["uri"], "https://sink.example");
        assert!(value.get("serviceAccountName").is_none());
    }
}
