//! Domain layer - Cluster identities, tagged objects and port definitions
//!
//! This module defines the core traits (ports) that registry readers,
//! connectors and list adapters implement, following hexagonal
//! architecture principles.

pub mod cluster;
pub mod ports;

pub use cluster::*;
pub use ports::*;
