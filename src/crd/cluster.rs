//! Cluster API Cluster CRD
//!
//! The subset of `cluster.x-k8s.io` `Cluster` the registry reader needs.
//! Unknown fields are ignored so newer CAPI releases still decode.

use crate::domain::cluster::ClusterIdentity;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// CAPI API group
pub const CAPI_GROUP: &str = "cluster.x-k8s.io";

/// CAPI version served by every supported release
pub const CAPI_DEFAULT_VERSION: &str = "v1beta1";

// =============================================================================
// Cluster CRD
// =============================================================================

/// A member cluster registered with the management cluster
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Cluster",
    plural = "clusters",
    status = "ClusterStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Reconciliation of this cluster is paused
    #[serde(default)]
    pub paused: Option<bool>,

    /// Endpoint of the member cluster's API server
    #[serde(default)]
    pub control_plane_endpoint: Option<ApiEndpoint>,
}

/// Host and port of an API server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoint {
    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub port: i32,
}

impl std::fmt::Display for ApiEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "https://{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Status
// =============================================================================

/// Observed state of a Cluster
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Lifecycle phase
    #[serde(default)]
    pub phase: Option<ClusterPhase>,

    /// Control plane has been initialized and is reachable
    #[serde(default)]
    pub control_plane_ready: bool,

    /// Infrastructure has been provisioned
    #[serde(default)]
    pub infrastructure_ready: bool,

    #[serde(default)]
    pub failure_reason: Option<String>,

    #[serde(default)]
    pub failure_message: Option<String>,

    #[serde(default)]
    pub observed_generation: Option<i64>,
}

/// Cluster lifecycle phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ClusterPhase {
    Pending,
    Provisioning,
    Provisioned,
    Deleting,
    Failed,
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterPhase::Pending => write!(f, "Pending"),
            ClusterPhase::Provisioning => write!(f, "Provisioning"),
            ClusterPhase::Provisioned => write!(f, "Provisioned"),
            ClusterPhase::Deleting => write!(f, "Deleting"),
            ClusterPhase::Failed => write!(f, "Failed"),
            ClusterPhase::Unknown => write!(f, "Unknown"),
        }
    }
}

impl Cluster {
    /// Identity of this cluster, if it carries a namespace
    pub fn identity(&self) -> Option<ClusterIdentity> {
        self.namespace()
            .map(|ns| ClusterIdentity::new(ns, self.name_any()))
    }

    /// Control plane reported ready and the cluster is not being torn down
    pub fn is_ready(&self) -> bool {
        let Some(status) = &self.status else {
            return false;
        };
        status.control_plane_ready
            && self.metadata.deletion_timestamp.is_none()
            && !matches!(status.phase, Some(ClusterPhase::Deleting | ClusterPhase::Failed))
    }
}
