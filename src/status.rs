//! Change detection for the persisted state of a GCSSource.
//!
//! The snapshot a pass starts from may be stale, so a write is only issued
//! when the pass actually changed something. Otherwise a newer status written
//! by someone else would be overwritten with old data.

use crate::crd::GcsSource;
use crate::finalizers::{FinalizerSet, FINALIZER_NAME};

/// Whether `candidate` differs from `original` in status or finalizers.
///
/// A missing status equals the empty status, and a missing finalizer list
/// equals an empty one; finalizer order is ignored.
pub fn needs_update(original: &GcsSource, candidate: &GcsSource) -> bool {
    original.status_or_default() != candidate.status_or_default()
        || FinalizerSet::from_meta(&original.metadata)
            != FinalizerSet::from_meta(&candidate.metadata)
}

/// A single write against the persisted source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    Finalizers,
    Status,
}

/// The writes that move the persisted source from `original` to
/// `candidate`, in the order they must be issued.
///
/// Adding our finalizer goes first, so status naming external resources is
/// never stored on an unprotected object. Otherwise status goes first:
/// dropping the last finalizer can let the object disappear, after which its
/// status can no longer be written.
pub fn write_plan(original: &GcsSource, candidate: &GcsSource) -> Vec<WriteStep> {
    let before = FinalizerSet::from_meta(&original.metadata);
    let after = FinalizerSet::from_meta(&candidate.metadata);
    let status_changed = original.status_or_default() != candidate.status_or_default();

    let mut plan = Vec::with_capacity(2);
    if before == after {
        if status_changed {
            plan.push(WriteStep::Status);
        }
        return plan;
    }

    let adding = after.contains(FINALIZER_NAME) && !before.contains(FINALIZER_NAME);
    if adding {
        plan.push(WriteStep::Finalizers);
    }
    if status_changed {
        plan.push(WriteStep::Status);
    }
    if !adding {
        plan.push(WriteStep::Finalizers);
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{GcsSourceSpec, GcsSourceStatus};

    fn source() -> GcsSource {
        let spec: GcsSourceSpec = serde_json::from_str(r#"{"bucket": "b1"}"#).unwrap();
        GcsSource::new("photos", spec)
    }

    #[test]
    fn test_identical_needs_no_update() {
        let original = source();
        assert!(!needs_update(&original, &original.clone()));
    }

    #[test]
    fn test_empty_status_equals_missing_status() {
        let original = source();
        let mut candidate = original.clone();
        candidate.status = Some(GcsSourceStatus::default());
        candidate.metadata.finalizers = Some(vec![]);
        assert!(!needs_update(&original, &candidate));
    }

    #[test]
    fn test_status_change_needs_update() {
        let original = source();
        let mut candidate = original.clone();
        candidate.status_mut().topic = "gcs-1".to_string();
        assert!(needs_update(&original, &candidate));
    }

    #[test]
    fn test_finalizer_change_needs_update() {
        let original = source();
        let mut candidate = original.clone();
        candidate.metadata.finalizers = Some(vec!["gcs-controller".to_string()]);
        assert!(needs_update(&original, &candidate));
    }

    #[test]
    fn test_finalizer_order_is_ignored() {
        let mut original = source();
        original.metadata.finalizers = Some(vec!["b".to_string(), "a".to_string()]);
        let mut candidate = original.clone();
        candidate.metadata.finalizers = Some(vec!["a".to_string(), "b".to_string()]);
        assert!(!needs_update(&original, &candidate));
    }

    #[test]
    fn test_unrelated_metadata_is_ignored() {
        let original = source();
        let mut candidate = original.clone();
        candidate.metadata.resource_version = Some("42".to_string());
        assert!(!needs_update(&original, &candidate));
    }

    #[test]
    fn test_plan_is_empty_without_changes() {
        let original = source();
        assert!(write_plan(&original, &original.clone()).is_empty());
    }

    #[test]
    fn test_plan_adds_finalizer_before_status() {
        let original = source();
        let mut candidate = original.clone();
        candidate.status_mut().topic = "gcs-1".to_string();
        candidate.metadata.finalizers = Some(vec![FINALIZER_NAME.to_string()]);
        assert_eq!(
            write_plan(&original, &candidate),
            vec![WriteStep::Finalizers, WriteStep::Status]
        );
    }

    #[test]
    fn test_plan_writes_status_before_releasing_finalizer() {
        let mut original = source();
        original.status_mut().topic = "gcs-1".to_string();
        original.metadata.finalizers = Some(vec![FINALIZER_NAME.to_string()]);
        let mut candidate = original.clone();
        candidate.status_mut().topic.clear();
        candidate.metadata.finalizers = Some(vec![]);
        assert_eq!(
            write_plan(&original, &candidate),
            vec![WriteStep::Status, WriteStep::Finalizers]
        );
    }

    #[test]
    fn test_plan_status_only() {
        let original = source();
        let mut candidate = original.clone();
        candidate.status_mut().sink_uri = "https://sink.example".to_string();
        assert_eq!(write_plan(&original, &candidate), vec![WriteStep::Status]);
    }
}
