//! GCSSource Custom Resource Definition
//!
//! Describes a Cloud Storage bucket whose object change notifications are
//! published to a Pub/Sub topic and relayed to a sink.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{OperatorError, Result};

/// GCSSource is the Schema for the gcssources API
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "sources.eventing.knative.dev",
    version = "v1alpha1",
    kind = "GCSSource",
    root = "GcsSource",
    namespaced,
    status = "GcsSourceStatus",
    derive = "PartialEq",
    shortname = "gcs",
    printcolumn = r#"{"name":"Bucket","type":"string","jsonPath":".spec.bucket"}"#,
    printcolumn = r#"{"name":"Topic","type":"string","jsonPath":".status.topic"}"#,
    printcolumn = r#"{"name":"Sink","type":"string","jsonPath":".status.sinkURI"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GcsSourceSpec {
    /// Kubernetes service account the relay runs as. Defaults to the
    /// namespace's `default` service account when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    /// Google Cloud project that owns the Pub/Sub topic
    #[serde(default)]
    pub google_cloud_project: String,

    /// Bucket to subscribe to
    pub bucket: String,

    /// Event types to subscribe to (all events when empty)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_types: Vec<String>,

    /// Limits notifications to objects with this name prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_name_prefix: Option<String>,

    /// Additional attributes attached to every published message
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_attributes: BTreeMap<String, String>,

    /// Contents of the message payload
    #[serde(default)]
    pub payload_format: PayloadFormat,

    /// Where relayed events are delivered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink: Option<SinkReference>,
}

/// Payload carried by each notification message.
///
/// See <https://cloud.google.com/storage/docs/pubsub-notifications#payload>.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum PayloadFormat {
    /// Object metadata rendered as JSON
    #[default]
    #[serde(rename = "JSON_API_V1")]
    JsonApiV1,
    /// Attributes only, empty body
    #[serde(rename = "NONE")]
    None,
}

impl PayloadFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadFormat::JsonApiV1 => "JSON_API_V1",
            PayloadFormat::None => "NONE",
        }
    }
}

/// Reference to the destination of relayed events.
///
/// Either `uri` is set, or `apiVersion`/`kind`/`name` point at an
/// addressable object.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SinkReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Defaults to the namespace of the referencing resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Literal destination URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// The concrete shape of a [`SinkReference`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget<'a> {
    Uri(&'a str),
    Object {
        api_version: &'a str,
        kind: &'a str,
        name: &'a str,
        namespace: Option<&'a str>,
    },
}

impl SinkReference {
    /// Classify the reference. A literal `uri` wins over an object reference.
    pub fn target(&self) -> Result<SinkTarget<'_>> {
        if let Some(uri) = self.uri.as_deref().filter(|u| !u.is_empty()) {
            return Ok(SinkTarget::Uri(uri));
        }
        match (
            self.api_version.as_deref(),
            self.kind.as_deref(),
            self.name.as_deref(),
        ) {
            (Some(api_version), Some(kind), Some(name))
                if !api_version.is_empty() && !kind.is_empty() && !name.is_empty() =>
            {
                Ok(SinkTarget::Object {
                    api_version,
                    kind,
                    name,
                    namespace: self.namespace.as_deref().filter(|n| !n.is_empty()),
                })
            }
            _ => Err(OperatorError::ResolutionFailed(
                "sink must set either uri or apiVersion, kind and name".to_string(),
            )),
        }
    }
}

/// Status of the GCSSource. Every field is owned by the controller.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GcsSourceStatus {
    /// Resolved sink URI, empty while unresolved
    #[serde(rename = "sinkURI", default, skip_serializing_if = "String::is_empty")]
    pub sink_uri: String,

    /// Pub/Sub topic the notifications are published to
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub topic: String,

    /// ID Cloud Storage assigned to the bucket notification
    #[serde(rename = "notificationID", default, skip_serializing_if = "String::is_empty")]
    pub notification_id: String,
}

impl GcsSource {
    /// Whether the resource has entered the Terminating phase.
    pub fn is_terminating(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Status, or the empty status when none has been written yet.
    pub fn status_or_default(&self) -> GcsSourceStatus {
        self.status.clone().unwrap_or_default()
    }

    pub fn status_mut(&mut self) -> &mut GcsSourceStatus {
        self.status.get_or_insert_with(GcsSourceStatus::default)
    }
}
