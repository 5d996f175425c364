//! CAPI Global Client
//!
//! A fan-out client that lists one resource kind across every Cluster API
//! member cluster registered with a management cluster, returning a single
//! cluster-tagged result set. One unreachable cluster never fails the call.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                          GlobalClient::list                                  │
//! │                (bounded fan-out, per-cluster deadline)                       │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────────────┐  ┌─────────────────────┐  │
//! │  │ Cluster Registry│  │   Connection Tracker    │  │  Type-Erased List   │  │
//! │  │ (CAPI Clusters) │  │ (cached handle/cluster) │  │  Adapter (ListSpec) │  │
//! │  └────────┬────────┘  └────────────┬────────────┘  └──────────┬──────────┘  │
//! │           │                        │                          │             │
//! │           │            ┌───────────┴───────────┐              │             │
//! │           │            │  Field Indexes (fixed │              │             │
//! │           │            │  at tracker build)    │              │             │
//! │           │            └───────────────────────┘              │             │
//! ├───────────┴────────────────────────┬──────────────────────────┴─────────────┤
//! │      Management Cluster            │          Member Clusters               │
//! │  (Cluster objects, kubeconfigs)    │   cluster-a   cluster-b   cluster-c    │
//! └────────────────────────────────────┴────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`client`]: the fan-out aggregator and its result type
//! - [`registry`]: member cluster discovery
//! - [`tracker`]: per-cluster connection cache and field indexes
//! - [`adapter`]: list specs and object containers
//! - [`crd`]: the CAPI `Cluster` resource
//! - [`domain`]: core domain types and traits
//! - [`error`]: error types and handling

pub mod adapter;
pub mod client;
pub mod crd;
pub mod domain;
pub mod error;
pub mod registry;
pub mod tracker;

// Re-export commonly used types
pub use adapter::{AdaptedList, DynamicList, DynamicResourceList, ResourceList, TypedList};

pub use client::{FanOutMetrics, GlobalClient, GlobalClientConfig, ListOutcome};

pub use crd::{Cluster, ClusterPhase, ClusterSpec, ClusterStatus};

pub use domain::cluster::{ClusterIdentity, ClusterObject};
pub use domain::ports::{
    ClusterConnector, ClusterHandle, ClusterRegistry, ListOptions, ListSpec, ObjectContainer,
};

pub use error::{Error, ErrorScope, Result};

pub use registry::{CapiClusterRegistry, CapiRegistryConfig, StaticRegistry};

pub use tracker::{
    ClusterTracker, ClusterTrackerBuilder, EvictionReason, FieldIndex, KubeconfigConnector,
    KubeconfigConnectorConfig, MemoryConnector, TrackerConfig, TrackerEvent,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
