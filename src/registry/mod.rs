//! Cluster Registry Readers
//!
//! Read the set of member clusters a fan-out call should visit:
//! - CAPI: `cluster.x-k8s.io` Cluster objects in the management cluster
//! - Static: a fixed list of clusters

pub mod capi;
pub mod fixed;

pub use capi::*;
pub use fixed::*;
