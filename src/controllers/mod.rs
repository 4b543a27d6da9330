//! Controllers for the GCS source operator
//!
//! The GCSSource controller watches GCSSource resources (and the relays they
//! own) and reconciles the external Pub/Sub and Cloud Storage state with the
//! desired state in each resource.

mod gcs_source;

pub use gcs_source::{Adapters, GcsSourceController, GcsSourceReconciler};
