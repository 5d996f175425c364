//! Cluster identity and cluster-tagged objects

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::str::FromStr;

/// Suffix of the secret holding a CAPI cluster's admin kubeconfig
pub const KUBECONFIG_SECRET_SUFFIX: &str = "-kubeconfig";

// =============================================================================
// Cluster Identity
// =============================================================================

/// Namespace-qualified name of a member cluster in the management cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterIdentity {
    pub namespace: String,
    pub name: String,
}

impl ClusterIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Name of the CAPI secret holding this cluster's kubeconfig
    pub fn kubeconfig_secret_name(&self) -> String {
        format!("{}{}", self.name, KUBECONFIG_SECRET_SUFFIX)
    }
}

impl std::fmt::Display for ClusterIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ClusterIdentity {
    type Err = Error;

    /// Parses `namespace/name`
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(namespace, name))
            }
            _ => Err(Error::InvalidClusterIdentity(format!(
                "expected namespace/name, got {:?}",
                s
            ))),
        }
    }
}

// =============================================================================
// Cluster-Tagged Object
// =============================================================================

/// An object paired with the member cluster it was listed from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterObject<T> {
    cluster: ClusterIdentity,
    object: T,
}

impl<T> ClusterObject<T> {
    pub fn new(cluster: ClusterIdentity, object: T) -> Self {
        Self { cluster, object }
    }

    /// Originating cluster
    pub fn cluster(&self) -> &ClusterIdentity {
        &self.cluster
    }

    /// Underlying object
    pub fn object(&self) -> &T {
        &self.object
    }

    /// Drop the cluster tag and keep the object
    pub fn into_object(self) -> T {
        self.object
    }

    /// Split into the cluster tag and the object
    pub fn into_parts(self) -> (ClusterIdentity, T) {
        (self.cluster, self.object)
    }
}

impl<T> Deref for ClusterObject<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object
    }
}
