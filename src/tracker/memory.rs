//! In-Memory Member Clusters
//!
//! A [`ClusterConnector`] backed by in-process object lists, with failure
//! injection. Used by tests and benchmarks.

use crate::domain::cluster::ClusterIdentity;
use crate::domain::ports::{
    ClusterConnector, ClusterHandle, ClusterHandleRef, ListOptions, ObjectContainer,
};
use crate::error::{Error, Result};
use crate::tracker::index::IndexSet;
use async_trait::async_trait;
use dashmap::DashMap;
use kube::core::{ApiResource, DynamicObject};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Memory Cluster
// =============================================================================

#[derive(Debug, Clone, Default)]
struct MemoryCluster {
    objects: Vec<DynamicObject>,
    unreachable: bool,
    list_failure: Option<String>,
    connect_delay: Option<Duration>,
    list_delay: Option<Duration>,
}

type ClusterStore = Arc<DashMap<ClusterIdentity, MemoryCluster>>;

// =============================================================================
// Memory Connector
// =============================================================================

/// Connector serving clusters held in memory
#[derive(Debug, Default)]
pub struct MemoryConnector {
    clusters: ClusterStore,
    connects: AtomicUsize,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reachable cluster holding `objects`
    pub fn with_cluster(self, cluster: ClusterIdentity, objects: Vec<DynamicObject>) -> Self {
        self.clusters.entry(cluster).or_default().objects = objects;
        self
    }

    /// Make connecting to `cluster` fail
    pub fn unreachable(self, cluster: &ClusterIdentity) -> Self {
        self.update(cluster, |c| c.unreachable = true);
        self
    }

    /// Make every list call on `cluster` fail
    pub fn failing_list(self, cluster: &ClusterIdentity, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        self.update(cluster, |c| c.list_failure = Some(reason));
        self
    }

    pub fn slow_connect(self, cluster: &ClusterIdentity, delay: Duration) -> Self {
        self.update(cluster, |c| c.connect_delay = Some(delay));
        self
    }

    pub fn slow_list(self, cluster: &ClusterIdentity, delay: Duration) -> Self {
        self.update(cluster, |c| c.list_delay = Some(delay));
        self
    }

    /// Replace the objects held by `cluster`
    pub fn set_objects(&self, cluster: &ClusterIdentity, objects: Vec<DynamicObject>) {
        self.update(cluster, |c| c.objects = objects);
    }

    /// Number of connection attempts made so far
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn update(&self, cluster: &ClusterIdentity, f: impl FnOnce(&mut MemoryCluster)) {
        f(&mut self.clusters.entry(cluster.clone()).or_default());
    }
}

#[async_trait]
impl ClusterConnector for MemoryConnector {
    async fn connect(
        &self,
        cluster: &ClusterIdentity,
        indexes: Arc<IndexSet>,
    ) -> Result<ClusterHandleRef> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let (unreachable, delay) = match self.clusters.get(cluster) {
            Some(c) => (c.unreachable, c.connect_delay),
            None => {
                return Err(Error::KubeconfigUnavailable {
                    namespace: cluster.namespace.clone(),
                    name: cluster.kubeconfig_secret_name(),
                    reason: "secret not found".into(),
                })
            }
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if unreachable {
            return Err(Error::Internal(format!("cluster {} is unreachable", cluster)));
        }

        debug!(cluster = %cluster, "Connected to in-memory cluster");
        Ok(Arc::new(MemoryHandle {
            cluster: cluster.clone(),
            clusters: self.clusters.clone(),
            indexes,
        }))
    }
}

// =============================================================================
// Memory Handle
// =============================================================================

/// Handle onto one in-memory cluster
#[derive(Debug)]
pub struct MemoryHandle {
    cluster: ClusterIdentity,
    clusters: ClusterStore,
    indexes: Arc<IndexSet>,
}

#[async_trait]
impl ClusterHandle for MemoryHandle {
    fn cluster(&self) -> &ClusterIdentity {
        &self.cluster
    }

    async fn list(&self, container: &mut dyn ObjectContainer, options: &ListOptions) -> Result<()> {
        let resource = container.api_resource();
        self.indexes.ensure_indexed(&resource, &options.fields)?;

        let snapshot = self.clusters.get(&self.cluster).map(|c| c.clone());
        let cluster = snapshot.ok_or_else(|| {
            Error::Internal(format!("cluster {} was removed", self.cluster))
        })?;

        if let Some(delay) = cluster.list_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = cluster.list_failure {
            return Err(Error::Internal(reason));
        }

        let selector = options
            .label_selector
            .as_deref()
            .map(parse_selector)
            .transpose()?;

        let candidates: Vec<DynamicObject> = cluster
            .objects
            .into_iter()
            .filter(|o| is_kind(o, &resource))
            .filter(|o| match &options.namespace {
                Some(ns) => o.metadata.namespace.as_deref() == Some(ns.as_str()),
                None => true,
            })
            .filter(|o| selector.as_ref().map_or(true, |s| s.iter().all(|r| r.matches(o))))
            .collect();

        let objects = self.indexes.filter(&resource, candidates, &options.fields)?;
        container.fill(objects)
    }
}

fn is_kind(object: &DynamicObject, resource: &ApiResource) -> bool {
    object
        .types
        .as_ref()
        .map(|t| t.kind == resource.kind && t.api_version == resource.api_version)
        .unwrap_or(false)
}

// =============================================================================
// Label Selector
// =============================================================================

enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    Exists(String),
}

impl Requirement {
    fn matches(&self, object: &DynamicObject) -> bool {
        let labels: &BTreeMap<String, String> = match &object.metadata.labels {
            Some(labels) => labels,
            None => return matches!(self, Requirement::NotEquals(..)),
        };
        match self {
            Requirement::Equals(k, v) => labels.get(k) == Some(v),
            Requirement::NotEquals(k, v) => labels.get(k) != Some(v),
            Requirement::Exists(k) => labels.contains_key(k),
        }
    }
}

/// Equality-based selectors only (`a=b`, `a==b`, `a!=b`, `a`)
fn parse_selector(selector: &str) -> Result<Vec<Requirement>> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|term| {
            if let Some((k, v)) = term.split_once("!=") {
                Ok(Requirement::NotEquals(k.trim().into(), v.trim().into()))
            } else if let Some((k, v)) = term.split_once("==").or_else(|| term.split_once('=')) {
                Ok(Requirement::Equals(k.trim().into(), v.trim().into()))
            } else if term.contains(char::is_whitespace) {
                Err(Error::Configuration(format!("unsupported label selector: {}", term)))
            } else {
                Ok(Requirement::Exists(term.into()))
            }
        })
        .collect()
}
