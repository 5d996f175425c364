//! Custom Resource Definitions read from the management cluster
//!
//! This module contains the CRD types the global client consumes:
//! - Cluster: Cluster API member cluster registration

pub mod cluster;

pub use cluster::*;
