//! Result of one fan-out list call

use crate::domain::cluster::{ClusterIdentity, ClusterObject};
use crate::error::Error;
use std::collections::BTreeMap;

/// Cluster-tagged objects plus the per-cluster errors of one list call
///
/// Items are in registry order, then in the order each cluster returned
/// them. A cluster appears either in `items` (possibly with zero objects)
/// or in `errors`, never both.
#[derive(Debug)]
pub struct ListOutcome<T> {
    items: Vec<ClusterObject<T>>,
    errors: BTreeMap<ClusterIdentity, Error>,
    clusters_total: usize,
}

impl<T> ListOutcome<T> {
    pub(crate) fn new(clusters_total: usize) -> Self {
        Self {
            items: Vec::new(),
            errors: BTreeMap::new(),
            clusters_total,
        }
    }

    pub(crate) fn extend(&mut self, cluster: &ClusterIdentity, objects: Vec<T>) {
        self.items.extend(
            objects
                .into_iter()
                .map(|object| ClusterObject::new(cluster.clone(), object)),
        );
    }

    pub(crate) fn record_error(&mut self, cluster: ClusterIdentity, error: Error) {
        self.errors.insert(cluster, error);
    }

    pub fn items(&self) -> &[ClusterObject<T>] {
        &self.items
    }

    pub fn into_items(self) -> Vec<ClusterObject<T>> {
        self.items
    }

    /// Per-cluster failures, keyed by cluster
    pub fn errors(&self) -> &BTreeMap<ClusterIdentity, Error> {
        &self.errors
    }

    pub fn into_parts(self) -> (Vec<ClusterObject<T>>, BTreeMap<ClusterIdentity, Error>) {
        (self.items, self.errors)
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Number of clusters the registry returned for this call
    pub fn clusters_total(&self) -> usize {
        self.clusters_total
    }

    /// Number of clusters listed without error
    pub fn succeeded(&self) -> usize {
        self.clusters_total.saturating_sub(self.errors.len())
    }

    /// True when every registered cluster was listed
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ClusterObject<T>> {
        self.items.iter()
    }
}

impl<T> IntoIterator for ListOutcome<T> {
    type Item = ClusterObject<T>;
    type IntoIter = std::vec::IntoIter<ClusterObject<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a ListOutcome<T> {
    type Item = &'a ClusterObject<T>;
    type IntoIter = std::slice::Iter<'a, ClusterObject<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
