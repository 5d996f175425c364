//! Domain Ports - Core trait definitions for the global client
//!
//! These traits define the boundaries between the fan-out logic and the
//! systems it talks to: the management cluster's registry of member
//! clusters, the connection layer, and the caller's object containers.

use crate::domain::cluster::ClusterIdentity;
use crate::error::Result;
use crate::tracker::index::IndexSet;
use async_trait::async_trait;
use kube::core::{ApiResource, DynamicObject};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// List Options
// =============================================================================

/// Filters applied to every member cluster's list call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Field name -> expected value; served through registered field indexes
    pub fields: BTreeMap<String, String>,
    /// Restrict to one namespace
    pub namespace: Option<String>,
    /// Label selector passed to the API server
    pub label_selector: Option<String>,
}

impl ListOptions {
    /// Add a field match (e.g. `metadata.name` = `nginx`)
    pub fn matching_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_labels(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }
}

// =============================================================================
// Cluster Registry Port
// =============================================================================

/// Port for reading the set of registered member clusters
#[async_trait]
pub trait ClusterRegistry: Send + Sync {
    /// Current member clusters, in registry order
    async fn list_clusters(&self) -> Result<Vec<ClusterIdentity>>;
}

// =============================================================================
// Connection Ports
// =============================================================================

/// A ready-to-use client bound to one member cluster
#[async_trait]
pub trait ClusterHandle: Send + Sync + std::fmt::Debug {
    /// Cluster this handle talks to
    fn cluster(&self) -> &ClusterIdentity;

    /// List objects of the container's resource kind and fill the container
    async fn list(&self, container: &mut dyn ObjectContainer, options: &ListOptions) -> Result<()>;
}

/// Port for establishing a connection to a member cluster
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    /// Connect to `cluster`; field filters are served through `indexes`
    async fn connect(
        &self,
        cluster: &ClusterIdentity,
        indexes: Arc<IndexSet>,
    ) -> Result<ClusterHandleRef>;
}

// =============================================================================
// List Adapter Ports
// =============================================================================

/// A generic, kind-specific list container a cluster handle can fill
///
/// The handle only sees the erased form: the resource's API coordinates
/// and a batch of dynamic objects. Decoding into the concrete type is the
/// container's business.
pub trait ObjectContainer: Send {
    /// API coordinates of the kind this container holds
    fn api_resource(&self) -> ApiResource;

    /// Replace the container's contents with `objects`
    fn fill(&mut self, objects: Vec<DynamicObject>) -> Result<()>;
}

/// Caller-supplied description of what to list and how to read it back
///
/// `new_container` must return an unfilled container on every call, and
/// `extract` must be a pure projection of the filled container.
pub trait ListSpec: Send + Sync {
    type Container: ObjectContainer;
    type Object: Send + 'static;

    fn new_container(&self) -> Self::Container;

    fn extract(&self, container: &Self::Container) -> Vec<Self::Object>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ClusterRegistryRef = Arc<dyn ClusterRegistry>;
pub type ClusterHandleRef = Arc<dyn ClusterHandle>;
pub type ClusterConnectorRef = Arc<dyn ClusterConnector>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_options_builder() {
        let opts = ListOptions::default()
            .matching_field("metadata.name", "nginx")
            .in_namespace("web")
            .with_labels("app=nginx");

        assert_eq!(opts.fields.get("metadata.name").map(String::as_str), Some("nginx"));
        assert_eq!(opts.namespace.as_deref(), Some("web"));
        assert_eq!(opts.label_selector.as_deref(), Some("app=nginx"));
    }
}
