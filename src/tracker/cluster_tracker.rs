//! Per-Cluster Connection Tracker
//!
//! Caches one connection handle per member cluster. Handles are created on
//! first use through a [`ClusterConnector`] and shared by every later
//! caller. Concurrent first requests for the same cluster share a single
//! connection attempt; a failed attempt caches nothing.

use crate::domain::cluster::ClusterIdentity;
use crate::domain::ports::{ClusterConnectorRef, ClusterHandleRef};
use crate::error::{Error, Result};
use crate::tracker::events::{EvictionReason, TrackerEvent};
use crate::tracker::index::{FieldIndex, IndexSet};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, OnceCell};
use tracing::{debug, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the connection tracker
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Upper bound on establishing one connection
    pub connect_timeout: Duration,
    /// Event channel capacity
    pub event_channel_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            event_channel_capacity: 256,
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
struct TrackerStats {
    connects: AtomicU64,
    connect_failures: AtomicU64,
    cache_hits: AtomicU64,
    evictions: AtomicU64,
}

/// Snapshot of tracker statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerStatsSnapshot {
    pub connects: u64,
    pub connect_failures: u64,
    pub cache_hits: u64,
    pub evictions: u64,
}

impl TrackerStats {
    fn snapshot(&self) -> TrackerStatsSnapshot {
        TrackerStatsSnapshot {
            connects: self.connects.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builds a [`ClusterTracker`]; field indexes can only be added here
pub struct ClusterTrackerBuilder {
    connector: ClusterConnectorRef,
    indexes: IndexSet,
    config: TrackerConfig,
    errors: Vec<Error>,
}

impl ClusterTrackerBuilder {
    /// Register a field index applied to every member cluster
    pub fn index(mut self, index: FieldIndex) -> Self {
        if let Err(e) = self.indexes.insert(index) {
            self.errors.push(e);
        }
        self
    }

    pub fn indexes(self, indexes: impl IntoIterator<Item = FieldIndex>) -> Self {
        indexes.into_iter().fold(self, Self::index)
    }

    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(mut self) -> Result<Arc<ClusterTracker>> {
        if let Some(e) = self.errors.pop() {
            return Err(e);
        }
        let (event_sender, _) = broadcast::channel(self.config.event_channel_capacity.max(1));

        Ok(Arc::new(ClusterTracker {
            connector: self.connector,
            indexes: Arc::new(self.indexes),
            handles: DashMap::new(),
            config: self.config,
            stats: TrackerStats::default(),
            event_sender,
        }))
    }
}

// =============================================================================
// Cluster Tracker
// =============================================================================

/// Lazily populated cache of member cluster connections
pub struct ClusterTracker {
    connector: ClusterConnectorRef,
    indexes: Arc<IndexSet>,
    handles: DashMap<ClusterIdentity, Arc<OnceCell<ClusterHandleRef>>>,
    config: TrackerConfig,
    stats: TrackerStats,
    event_sender: broadcast::Sender<TrackerEvent>,
}

impl std::fmt::Debug for ClusterTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterTracker")
            .field("indexes", &self.indexes)
            .field("clusters", &self.handles.len())
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl ClusterTracker {
    pub fn builder(connector: ClusterConnectorRef) -> ClusterTrackerBuilder {
        ClusterTrackerBuilder {
            connector,
            indexes: IndexSet::new(),
            config: TrackerConfig::default(),
            errors: Vec::new(),
        }
    }

    /// Get an event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.event_sender.subscribe()
    }

    /// Field indexes shared with every connection
    pub fn indexes(&self) -> &Arc<IndexSet> {
        &self.indexes
    }

    /// Return the cached handle for `cluster`, connecting on first use
    pub async fn get_connection(&self, cluster: &ClusterIdentity) -> Result<ClusterHandleRef> {
        let cell = Arc::clone(&self.handles.entry(cluster.clone()).or_default());

        if let Some(handle) = cell.get() {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!(cluster = %cluster, "Using cached connection");
            return Ok(handle.clone());
        }

        match cell.get_or_try_init(|| self.establish(cluster)).await {
            Ok(handle) => Ok(handle.clone()),
            Err(e) => {
                // Leave no empty slot behind for clusters that never connected
                self.handles
                    .remove_if(cluster, |_, c| Arc::ptr_eq(c, &cell) && c.get().is_none());
                Err(e)
            }
        }
    }

    async fn establish(&self, cluster: &ClusterIdentity) -> Result<ClusterHandleRef> {
        info!(cluster = %cluster, indexes = self.indexes.len(), "Establishing connection");

        let connect = self.connector.connect(cluster, self.indexes.clone());
        let result = match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Ok(result) => result.map_err(|e| Error::connection(cluster, e)),
            Err(_) => Err(Error::ClusterTimeout {
                cluster: cluster.to_string(),
                timeout: self.config.connect_timeout,
            }),
        };

        match &result {
            Ok(_) => {
                self.stats.connects.fetch_add(1, Ordering::Relaxed);
                let _ = self.event_sender.send(TrackerEvent::Connected {
                    cluster: cluster.clone(),
                });
            }
            Err(e) => {
                self.stats.connect_failures.fetch_add(1, Ordering::Relaxed);
                warn!(cluster = %cluster, error = %e, "Connection failed");
                let _ = self.event_sender.send(TrackerEvent::ConnectFailed {
                    cluster: cluster.clone(),
                    reason: e.to_string(),
                });
            }
        }

        result
    }

    /// Drop the cached handle for `cluster`
    ///
    /// A connection still being established is left alone so that waiters
    /// and later callers keep sharing the one attempt.
    pub fn evict(&self, cluster: &ClusterIdentity, reason: EvictionReason) -> bool {
        if self
            .handles
            .remove_if(cluster, |_, cell| cell.get().is_some())
            .is_none()
        {
            return false;
        }

        self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        info!(cluster = %cluster, reason = %reason, "Evicted cached connection");
        let _ = self.event_sender.send(TrackerEvent::Evicted {
            cluster: cluster.clone(),
            reason,
        });
        true
    }

    /// Evict every cached cluster not in `registered`; returns the eviction count
    pub fn retain(&self, registered: &[ClusterIdentity]) -> usize {
        let live: HashSet<&ClusterIdentity> = registered.iter().collect();
        let stale: Vec<ClusterIdentity> = self
            .handles
            .iter()
            .filter(|entry| !live.contains(entry.key()) && entry.value().get().is_some())
            .map(|entry| entry.key().clone())
            .collect();

        stale
            .iter()
            .filter(|cluster| self.evict(cluster, EvictionReason::Deregistered))
            .count()
    }

    /// Check whether a connected handle is cached for `cluster`
    pub fn contains(&self, cluster: &ClusterIdentity) -> bool {
        self.handles
            .get(cluster)
            .map(|cell| cell.get().is_some())
            .unwrap_or(false)
    }

    /// Number of cached connected handles
    pub fn len(&self) -> usize {
        self.handles.iter().filter(|e| e.value().get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> TrackerStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::memory::MemoryConnector;
    use assert_matches::assert_matches;
    use k8s_openapi::api::core::v1::Pod;
    use kube::core::ApiResource;

    fn id(name: &str) -> ClusterIdentity {
        ClusterIdentity::new("default", name)
    }

    #[tokio::test]
    async fn test_connection_is_cached() {
        let connector = Arc::new(MemoryConnector::new().with_cluster(id("a"), vec![]));
        let tracker = ClusterTracker::builder(connector.clone()).build().unwrap();

        let first = tracker.get_connection(&id("a")).await.unwrap();
        let second = tracker.get_connection(&id("a")).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.connect_count(), 1);
        assert_eq!(tracker.stats().cache_hits, 1);
        assert!(tracker.contains(&id("a")));
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_connect_once() {
        let connector = Arc::new(
            MemoryConnector::new()
                .with_cluster(id("a"), vec![])
                .slow_connect(&id("a"), Duration::from_millis(50)),
        );
        let tracker = ClusterTracker::builder(connector.clone()).build().unwrap();

        let a = id("a");
        let handles = futures::future::join_all((0..8).map(|_| tracker.get_connection(&a))).await;

        assert!(handles.iter().all(|h| h.is_ok()));
        assert_eq!(connector.connect_count(), 1);
        assert_eq!(tracker.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_connection_is_not_cached() {
        let connector = Arc::new(MemoryConnector::new().with_cluster(id("b"), vec![]).unreachable(&id("b")));
        let tracker = ClusterTracker::builder(connector.clone()).build().unwrap();
        let mut events = tracker.subscribe();

        let err = tracker.get_connection(&id("b")).await.unwrap_err();
        assert_matches!(err, Error::Connection { ref cluster, .. } if cluster == "default/b");
        assert!(!tracker.contains(&id("b")));
        assert!(tracker.is_empty());

        // Next call tries again
        let _ = tracker.get_connection(&id("b")).await;
        assert_eq!(connector.connect_count(), 2);
        assert!(events.recv().await.unwrap().is_failure());
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        let connector = Arc::new(
            MemoryConnector::new()
                .with_cluster(id("slow"), vec![])
                .slow_connect(&id("slow"), Duration::from_secs(5)),
        );
        let tracker = ClusterTracker::builder(connector)
            .config(TrackerConfig {
                connect_timeout: Duration::from_millis(20),
                ..Default::default()
            })
            .build()
            .unwrap();

        assert_matches!(
            tracker.get_connection(&id("slow")).await,
            Err(Error::ClusterTimeout { .. })
        );
    }

    #[tokio::test]
    async fn test_retain_evicts_deregistered_clusters() {
        let connector = Arc::new(
            MemoryConnector::new()
                .with_cluster(id("a"), vec![])
                .with_cluster(id("b"), vec![]),
        );
        let tracker = ClusterTracker::builder(connector).build().unwrap();
        tracker.get_connection(&id("a")).await.unwrap();
        tracker.get_connection(&id("b")).await.unwrap();

        let evicted = tracker.retain(&[id("a")]);

        assert_eq!(evicted, 1);
        assert!(tracker.contains(&id("a")));
        assert!(!tracker.contains(&id("b")));
        assert_eq!(tracker.stats().evictions, 1);
        assert!(!tracker.evict(&id("b"), EvictionReason::Manual));
    }

    #[tokio::test]
    async fn test_evict_during_connect_keeps_single_attempt() {
        let connector = Arc::new(
            MemoryConnector::new()
                .with_cluster(id("a"), vec![])
                .slow_connect(&id("a"), Duration::from_millis(100)),
        );
        let tracker = ClusterTracker::builder(connector.clone()).build().unwrap();

        let first = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.get_connection(&id("a")).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!tracker.evict(&id("a"), EvictionReason::Manual));
        assert_eq!(tracker.retain(&[]), 0);

        let second = tracker.get_connection(&id("a")).await.unwrap();
        let first = first.await.unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.connect_count(), 1);
        assert!(tracker.contains(&id("a")));
        assert_eq!(tracker.stats().evictions, 0);
    }

    #[test]
    fn test_duplicate_index_fails_build() {
        let pods = ApiResource::erase::<Pod>(&());
        let result = ClusterTracker::builder(Arc::new(MemoryConnector::new()))
            .index(FieldIndex::metadata_name(&pods))
            .index(FieldIndex::metadata_name(&pods))
            .build();
        assert_matches!(result, Err(Error::DuplicateIndex { .. }));
    }
}
