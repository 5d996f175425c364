//! Per-Cluster Connection Tracker
//!
//! Lazily connects to member clusters and caches one handle per cluster.
//! Field indexes registered on the tracker apply to every member cluster.

pub mod cluster_tracker;
pub mod events;
pub mod index;
pub mod kubeconfig;
pub mod memory;

pub use cluster_tracker::*;
pub use events::*;
pub use index::*;
pub use kubeconfig::*;
pub use memory::*;
