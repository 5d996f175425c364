//! Cluster API Registry Reader
//!
//! Lists `Cluster` objects from the management cluster. The served CAPI
//! version is configurable; objects are read dynamically and decoded into
//! [`crd::Cluster`](crate::crd::Cluster), which tolerates extra fields.

use crate::adapter::container::decode_object;
use crate::crd::{Cluster, CAPI_DEFAULT_VERSION, CAPI_GROUP};
use crate::domain::cluster::ClusterIdentity;
use crate::domain::ports::ClusterRegistry;
use crate::error::{Error, Result};
use async_trait::async_trait;
use kube::api::{Api, ListParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Client, ResourceExt};
use tracing::{debug, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the CAPI registry reader
#[derive(Debug, Clone)]
pub struct CapiRegistryConfig {
    /// Served `cluster.x-k8s.io` version to read
    pub version: String,
    /// Only read clusters from this namespace
    pub namespace: Option<String>,
    /// Label selector for Cluster objects
    pub label_selector: Option<String>,
    /// Skip clusters whose control plane is not ready
    pub ready_only: bool,
}

impl Default for CapiRegistryConfig {
    fn default() -> Self {
        Self {
            version: CAPI_DEFAULT_VERSION.to_string(),
            namespace: None,
            label_selector: None,
            ready_only: false,
        }
    }
}

impl CapiRegistryConfig {
    /// API coordinates of the configured Cluster version
    pub fn api_resource(&self) -> ApiResource {
        ApiResource::from_gvk_with_plural(
            &GroupVersionKind::gvk(CAPI_GROUP, &self.version, "Cluster"),
            "clusters",
        )
    }
}

// =============================================================================
// CAPI Registry
// =============================================================================

/// Reads member clusters from CAPI Cluster objects
pub struct CapiClusterRegistry {
    client: Client,
    config: CapiRegistryConfig,
}

impl CapiClusterRegistry {
    pub fn new(client: Client) -> Self {
        Self::with_config(client, CapiRegistryConfig::default())
    }

    pub fn with_config(client: Client, config: CapiRegistryConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ClusterRegistry for CapiClusterRegistry {
    async fn list_clusters(&self) -> Result<Vec<ClusterIdentity>> {
        let resource = self.config.api_resource();
        let api: Api<DynamicObject> = match &self.config.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        };

        let mut params = ListParams::default();
        if let Some(selector) = &self.config.label_selector {
            params = params.labels(selector);
        }

        let list = api.list(&params).await.map_err(|e| Error::RegistryUnavailable {
            reason: format!("listing {}: {}", resource.api_version, e),
        })?;

        let total = list.items.len();
        let clusters = select_clusters(list.items, self.config.ready_only);
        info!(registered = total, selected = clusters.len(), "Read cluster registry");

        Ok(clusters)
    }
}

/// Turn listed Cluster objects into identities, keeping their order
fn select_clusters(objects: Vec<DynamicObject>, ready_only: bool) -> Vec<ClusterIdentity> {
    objects
        .into_iter()
        .filter_map(|obj| {
            let Some(namespace) = obj.namespace() else {
                warn!(cluster = %obj.name_any(), "Skipping cluster without namespace");
                return None;
            };
            let identity = ClusterIdentity::new(namespace, obj.name_any());

            if ready_only {
                let ready = decode_object::<Cluster>(&obj, "Cluster")
                    .map(|c| c.is_ready())
                    .unwrap_or(false);
                if !ready {
                    debug!(cluster = %identity, "Skipping cluster with unready control plane");
                    return None;
                }
            }
            Some(identity)
        })
        .collect()
}
