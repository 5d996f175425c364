//! Tracker Events
//!
//! Events emitted by the connection tracker for external consumers to
//! react to member cluster connection lifecycle changes.

use crate::domain::cluster::ClusterIdentity;
use serde::{Deserialize, Serialize};

/// Events emitted by the connection tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrackerEvent {
    /// A new connection was established and cached
    Connected { cluster: ClusterIdentity },

    /// Establishing a connection failed; nothing was cached
    ConnectFailed {
        cluster: ClusterIdentity,
        reason: String,
    },

    /// A cached connection was dropped
    Evicted {
        cluster: ClusterIdentity,
        reason: EvictionReason,
    },
}

/// Why a cached connection was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionReason {
    /// The cluster is no longer in the registry
    Deregistered,
    /// A fan-out call to the cluster timed out
    Timeout,
    /// Evicted on request
    Manual,
}

impl std::fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictionReason::Deregistered => write!(f, "deregistered"),
            EvictionReason::Timeout => write!(f, "timeout"),
            EvictionReason::Manual => write!(f, "manual"),
        }
    }
}

impl TrackerEvent {
    /// Get the cluster associated with this event
    pub fn cluster(&self) -> &ClusterIdentity {
        match self {
            TrackerEvent::Connected { cluster } => cluster,
            TrackerEvent::ConnectFailed { cluster, .. } => cluster,
            TrackerEvent::Evicted { cluster, .. } => cluster,
        }
    }

    /// Check if this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, TrackerEvent::ConnectFailed { .. })
    }
}
