//! Fan-out Aggregator
//!
//! Issues one list against every registered member cluster and merges the
//! cluster-tagged results. Per-cluster failures are collected, never fatal.

pub mod global;
pub mod metrics;
pub mod outcome;

pub use global::*;
pub use metrics::*;
pub use outcome::*;
