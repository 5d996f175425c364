//! Global Client
//!
//! One logical client over every member cluster: read the registry, list
//! each cluster through its cached handle, tag what comes back.

use crate::client::metrics::FanOutMetrics;
use crate::client::outcome::ListOutcome;
use crate::domain::cluster::ClusterIdentity;
use crate::domain::ports::{ClusterRegistryRef, ListOptions, ListSpec};
use crate::error::{Error, Result};
use crate::tracker::cluster_tracker::ClusterTracker;
use crate::tracker::events::EvictionReason;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the global client
#[derive(Debug, Clone)]
pub struct GlobalClientConfig {
    /// Member clusters listed at the same time
    pub max_concurrency: usize,
    /// Upper bound on connecting to and listing one cluster
    pub cluster_timeout: Duration,
    /// Drop cached handles of clusters missing from the latest registry read
    pub evict_deregistered: bool,
}

impl Default for GlobalClientConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            cluster_timeout: Duration::from_secs(30),
            evict_deregistered: true,
        }
    }
}

// =============================================================================
// Global Client
// =============================================================================

/// Fan-out client listing one resource kind across all member clusters
pub struct GlobalClient {
    registry: ClusterRegistryRef,
    tracker: Arc<ClusterTracker>,
    config: GlobalClientConfig,
    metrics: Option<FanOutMetrics>,
}

impl GlobalClient {
    pub fn new(
        registry: ClusterRegistryRef,
        tracker: Arc<ClusterTracker>,
        config: GlobalClientConfig,
    ) -> Self {
        Self {
            registry,
            tracker,
            config,
            metrics: None,
        }
    }

    /// Record every list call on `metrics`
    pub fn with_metrics(mut self, metrics: FanOutMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn tracker(&self) -> &Arc<ClusterTracker> {
        &self.tracker
    }

    pub fn config(&self) -> &GlobalClientConfig {
        &self.config
    }

    /// List objects described by `spec` on every registered member cluster
    ///
    /// Fails only when the registry cannot be read. Connection and list
    /// failures are recorded per cluster in the returned outcome.
    pub async fn list<L: ListSpec>(
        &self,
        spec: &L,
        options: &ListOptions,
    ) -> Result<ListOutcome<L::Object>> {
        let started = Instant::now();

        let clusters = self.registry.list_clusters().await.map_err(|e| match e {
            e @ Error::RegistryUnavailable { .. } => e,
            other => Error::RegistryUnavailable {
                reason: other.to_string(),
            },
        })?;

        let clusters = dedup_clusters(clusters);

        if self.config.evict_deregistered {
            let evicted = self.tracker.retain(&clusters);
            if evicted > 0 {
                info!(evicted, "Dropped connections to deregistered clusters");
            }
        }

        debug!(clusters = clusters.len(), "Fanning out list");
        let mut outcome = ListOutcome::new(clusters.len());

        // buffered() yields in input order, so results stay in registry order
        let results: Vec<(ClusterIdentity, Result<Vec<L::Object>>)> = stream::iter(clusters)
            .map(|cluster| async move {
                let result = self.list_bounded(spec, &cluster, options).await;
                (cluster, result)
            })
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        for (cluster, result) in results {
            match result {
                Ok(objects) => {
                    debug!(cluster = %cluster, objects = objects.len(), "Listed cluster");
                    outcome.extend(&cluster, objects);
                }
                Err(e) => {
                    warn!(cluster = %cluster, error = %e, "Cluster list failed");
                    outcome.record_error(cluster, e);
                }
            }
        }

        if outcome.error_count() > 0 {
            warn!(
                failed = outcome.error_count(),
                total = outcome.clusters_total(),
                "Ignored per-cluster errors during fan-out list"
            );
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_call(
                outcome.succeeded(),
                outcome.len(),
                outcome.errors().values().map(Error::kind_label),
                started.elapsed(),
            );
        }

        Ok(outcome)
    }

    async fn list_bounded<L: ListSpec>(
        &self,
        spec: &L,
        cluster: &ClusterIdentity,
        options: &ListOptions,
    ) -> Result<Vec<L::Object>> {
        let timeout = self.config.cluster_timeout;
        match tokio::time::timeout(timeout, self.list_cluster(spec, cluster, options)).await {
            Ok(result) => result,
            Err(_) => {
                self.tracker.evict(cluster, EvictionReason::Timeout);
                Err(Error::ClusterTimeout {
                    cluster: cluster.to_string(),
                    timeout,
                })
            }
        }
    }

    async fn list_cluster<L: ListSpec>(
        &self,
        spec: &L,
        cluster: &ClusterIdentity,
        options: &ListOptions,
    ) -> Result<Vec<L::Object>> {
        let handle = self.tracker.get_connection(cluster).await?;

        let mut container = spec.new_container();
        handle
            .list(&mut container, options)
            .await
            .map_err(|e| Error::list(cluster, e))?;

        Ok(spec.extract(&container))
    }
}

/// Drop repeated identities, keeping first-occurrence order
fn dedup_clusters(clusters: Vec<ClusterIdentity>) -> Vec<ClusterIdentity> {
    let mut seen = HashSet::with_capacity(clusters.len());
    clusters
        .into_iter()
        .filter(|cluster| seen.insert(cluster.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::container::ResourceList;
    use crate::adapter::list::{AdaptedList, DynamicList, TypedList};
    use crate::domain::ports::ClusterRegistry;
    use crate::registry::fixed::StaticRegistry;
    use crate::tracker::index::FieldIndex;
    use crate::tracker::memory::MemoryConnector;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::Pod;
    use kube::core::{ApiResource, DynamicObject};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn id(name: &str) -> ClusterIdentity {
        ClusterIdentity::new("fleet", name)
    }

    fn pods() -> ApiResource {
        ApiResource::erase::<Pod>(&())
    }

    fn pod(name: &str, ns: &str, node: &str) -> DynamicObject {
        DynamicObject::new(name, &pods())
            .within(ns)
            .data(json!({ "spec": { "nodeName": node, "containers": [] } }))
    }

    fn client(registry: StaticRegistry, tracker: Arc<ClusterTracker>) -> GlobalClient {
        GlobalClient::new(Arc::new(registry), tracker, GlobalClientConfig::default())
    }

    fn tracker(connector: MemoryConnector) -> Arc<ClusterTracker> {
        ClusterTracker::builder(Arc::new(connector))
            .index(FieldIndex::metadata_name(&pods()))
            .index(FieldIndex::json_path(&pods(), "spec.nodeName"))
            .build()
            .unwrap()
    }

    struct BrokenRegistry;

    #[async_trait]
    impl ClusterRegistry for BrokenRegistry {
        async fn list_clusters(&self) -> Result<Vec<ClusterIdentity>> {
            Err(Error::Internal("management API server refused connection".into()))
        }
    }

    #[tokio::test]
    async fn test_unreachable_cluster_is_isolated() {
        let connector = MemoryConnector::new()
            .with_cluster(id("a"), vec![pod("nginx", "web", "n1")])
            .with_cluster(id("b"), vec![pod("nginx", "web", "n2")])
            .unreachable(&id("b"));
        let client = client(StaticRegistry::new(vec![id("a"), id("b")]), tracker(connector));

        let outcome = client
            .list(
                &TypedList::<Pod>::new(),
                &ListOptions::default().matching_field("metadata.name", "nginx"),
            )
            .await
            .unwrap();

        assert_eq!(outcome.len(), 1);
        assert_eq!(outcome.items()[0].cluster(), &id("a"));
        assert_eq!(outcome.items()[0].metadata.name.as_deref(), Some("nginx"));
        assert_eq!(outcome.error_count(), 1);
        assert_matches!(outcome.errors().get(&id("b")), Some(Error::Connection { .. }));
    }

    #[tokio::test]
    async fn test_repeated_registry_entries_are_listed_once() {
        let connector = MemoryConnector::new()
            .with_cluster(id("a"), vec![pod("api", "web", "n1")])
            .with_cluster(id("b"), vec![])
            .unreachable(&id("b"));
        let metrics = FanOutMetrics::new().unwrap();
        let client = client(
            StaticRegistry::new(vec![id("b"), id("a"), id("b"), id("a")]),
            tracker(connector),
        )
        .with_metrics(metrics.clone());

        let outcome = client
            .list(&TypedList::<Pod>::new(), &ListOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.clusters_total(), 2);
        assert_eq!(outcome.len(), 1);
        assert_eq!(outcome.error_count(), 1);
        assert_eq!(outcome.succeeded(), 1);
        assert!(outcome.errors().contains_key(&id("b")));
        assert_eq!(metrics.cluster_errors("connection"), 1);
    }

    #[test]
    fn test_dedup_keeps_first_occurrence_order() {
        let clusters = dedup_clusters(vec![id("c"), id("a"), id("c"), id("b"), id("a")]);
        assert_eq!(clusters, vec![id("c"), id("a"), id("b")]);
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let client = client(StaticRegistry::default(), tracker(MemoryConnector::new()));

        let outcome = client
            .list(&TypedList::<Pod>::new(), &ListOptions::default())
            .await
            .unwrap();

        assert!(outcome.is_empty());
        assert!(outcome.is_complete());
        assert_eq!(outcome.clusters_total(), 0);
    }

    #[tokio::test]
    async fn test_registry_failure_fails_call() {
        let connector = Arc::new(MemoryConnector::new().with_cluster(id("a"), vec![]));
        let tracker = ClusterTracker::builder(connector.clone()).build().unwrap();
        let client = GlobalClient::new(Arc::new(BrokenRegistry), tracker, GlobalClientConfig::default());

        let result = client.list(&TypedList::<Pod>::new(), &ListOptions::default()).await;

        assert_matches!(result, Err(Error::RegistryUnavailable { reason }) if reason.contains("refused"));
        assert_eq!(connector.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_list_failure_only_affects_its_cluster() {
        let connector = MemoryConnector::new()
            .with_cluster(id("a"), vec![pod("api", "web", "n1"), pod("db", "data", "n1")])
            .with_cluster(id("b"), vec![pod("api", "web", "n2")])
            .failing_list(&id("b"), "etcdserver: request timed out")
            .with_cluster(id("c"), vec![pod("cache", "web", "n3")]);
        let client = client(
            StaticRegistry::new(vec![id("a"), id("b"), id("c")]),
            tracker(connector),
        );

        let outcome = client
            .list(&DynamicList::new(pods()), &ListOptions::default())
            .await
            .unwrap();

        let tags: Vec<_> = outcome.iter().map(|o| o.cluster().name.as_str()).collect();
        assert_eq!(tags, vec!["a", "a", "c"]);
        assert_eq!(outcome.succeeded(), 2);
        assert_matches!(
            outcome.errors().get(&id("b")),
            Some(Error::List { cluster, .. }) if cluster == "fleet/b"
        );
    }

    #[tokio::test]
    async fn test_zero_matches_is_not_an_error() {
        let connector = MemoryConnector::new().with_cluster(id("a"), vec![pod("api", "web", "n1")]);
        let client = client(StaticRegistry::new(vec![id("a")]), tracker(connector));

        let outcome = client
            .list(
                &TypedList::<Pod>::new(),
                &ListOptions::default().matching_field("spec.nodeName", "n9"),
            )
            .await
            .unwrap();

        assert!(outcome.is_empty());
        assert!(outcome.is_complete());
        assert_eq!(outcome.succeeded(), 1);
    }

    #[tokio::test]
    async fn test_containers_never_leak_between_calls() {
        let connector = MemoryConnector::new()
            .with_cluster(id("a"), vec![pod("api", "web", "n1"), pod("db", "data", "n2")])
            .with_cluster(id("b"), vec![pod("api", "web", "n3")]);
        let client = client(StaticRegistry::new(vec![id("a"), id("b")]), tracker(connector));

        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        let spec = AdaptedList::new(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                ResourceList::<Pod>::new()
            },
            |list: &ResourceList<Pod>| {
                list.items()
                    .iter()
                    .filter_map(|p| p.metadata.name.clone())
                    .collect::<Vec<_>>()
            },
        );

        let narrow = client
            .list(&spec, &ListOptions::default().matching_field("spec.nodeName", "n2"))
            .await
            .unwrap();
        let wide = client.list(&spec, &ListOptions::default()).await.unwrap();

        let names = |o: ListOutcome<String>| o.into_iter().map(|c| c.into_object()).collect::<Vec<_>>();
        assert_eq!(names(narrow), vec!["db"]);
        assert_eq!(names(wide), vec!["api", "db", "api"]);
        assert_eq!(created.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_order_follows_registry_under_parallelism() {
        let connector = MemoryConnector::new()
            .with_cluster(id("slow"), vec![pod("first", "web", "n1")])
            .slow_list(&id("slow"), Duration::from_millis(80))
            .with_cluster(id("fast"), vec![pod("second", "web", "n2")]);
        let client = client(
            StaticRegistry::new(vec![id("slow"), id("fast")]),
            tracker(connector),
        );

        let outcome = client
            .list(&DynamicList::new(pods()), &ListOptions::default())
            .await
            .unwrap();

        let names: Vec<_> = outcome.iter().filter_map(|o| o.metadata.name.clone()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_timed_out_cluster_is_evicted() {
        let connector = MemoryConnector::new()
            .with_cluster(id("a"), vec![pod("api", "web", "n1")])
            .with_cluster(id("stuck"), vec![])
            .slow_list(&id("stuck"), Duration::from_secs(5));
        let tracker = tracker(connector);
        let client = GlobalClient::new(
            Arc::new(StaticRegistry::new(vec![id("a"), id("stuck")])),
            tracker.clone(),
            GlobalClientConfig {
                cluster_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        );

        let outcome = client
            .list(&TypedList::<Pod>::new(), &ListOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.len(), 1);
        assert_matches!(
            outcome.errors().get(&id("stuck")),
            Some(Error::ClusterTimeout { .. })
        );
        assert!(tracker.contains(&id("a")));
        assert!(!tracker.contains(&id("stuck")));
    }

    #[tokio::test]
    async fn test_unindexed_field_is_a_cluster_error() {
        let connector = MemoryConnector::new().with_cluster(id("a"), vec![pod("api", "web", "n1")]);
        let client = client(StaticRegistry::new(vec![id("a")]), tracker(connector));

        let outcome = client
            .list(
                &TypedList::<Pod>::new(),
                &ListOptions::default().matching_field("status.phase", "Running"),
            )
            .await
            .unwrap();

        let error = outcome.errors().get(&id("a")).unwrap();
        assert_matches!(error, Error::List { .. });
        assert_matches!(error.root_cause(), Error::IndexNotRegistered { field, .. } if field == "status.phase");
    }

    #[tokio::test]
    async fn test_deregistered_clusters_are_evicted() {
        let connector = MemoryConnector::new()
            .with_cluster(id("a"), vec![])
            .with_cluster(id("b"), vec![]);
        let tracker = tracker(connector);

        let before = client(StaticRegistry::new(vec![id("a"), id("b")]), tracker.clone());
        before.list(&TypedList::<Pod>::new(), &ListOptions::default()).await.unwrap();
        assert_eq!(tracker.len(), 2);

        let after = client(StaticRegistry::new(vec![id("a")]), tracker.clone());
        after.list(&TypedList::<Pod>::new(), &ListOptions::default()).await.unwrap();

        assert!(tracker.contains(&id("a")));
        assert!(!tracker.contains(&id("b")));
        assert_eq!(tracker.stats().connects, 2);
    }

    #[tokio::test]
    async fn test_metrics_recorded() {
        let connector = MemoryConnector::new()
            .with_cluster(id("a"), vec![pod("api", "web", "n1")])
            .with_cluster(id("b"), vec![])
            .unreachable(&id("b"));
        let metrics = FanOutMetrics::new().unwrap();
        let client = client(StaticRegistry::new(vec![id("a"), id("b")]), tracker(connector))
            .with_metrics(metrics.clone());

        client.list(&TypedList::<Pod>::new(), &ListOptions::default()).await.unwrap();

        assert_eq!(metrics.list_calls(), 1);
        assert_eq!(metrics.objects_returned(), 1);
        assert_eq!(metrics.cluster_errors("connection"), 1);
    }
}
