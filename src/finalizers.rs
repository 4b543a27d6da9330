//! Finalizer bookkeeping
//!
//! Finalizers are kept as an ordered, deduplicated set and written back as a
//! sorted list so the persisted form is stable across passes.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeSet;

/// Finalizer owned by this controller
pub const FINALIZER_NAME: &str = "gcs-controller";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizerSet(BTreeSet<String>);

impl FinalizerSet {
    pub fn from_meta(meta: &ObjectMeta) -> Self {
        meta.finalizers.iter().flatten().cloned().collect()
    }

    /// Returns `true` if the token was not already present.
    pub fn add(&mut self, token: &str) -> bool {
        self.0.insert(token.to_string())
    }

    /// Returns `true` if the token was present.
    pub fn remove(&mut self, token: &str) -> bool {
        self.0.remove(token)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sorted list form
    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }

    pub fn write_to(&self, meta: &mut ObjectMeta) {
        meta.finalizers = Some(self.to_vec());
    }
}

impl FromIterator<String> for FinalizerSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

pub fn add_finalizer(meta: &mut ObjectMeta, token: &str) {
    let mut set = FinalizerSet::from_meta(meta);
    set.add(token);
    set.write_to(meta);
}

pub fn remove_finalizer(meta: &mut ObjectMeta, token: &str) {
    let mut set = FinalizerSet::from_meta(meta);
    set.remove(token);
    set.write_to(meta);
}
