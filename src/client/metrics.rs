//! Fan-out Metrics
//!
//! Prometheus collectors for list calls. Registered on a caller-provided
//! registry so several clients can coexist in one process.

use crate::error::Result;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::time::Duration;

/// Collectors updated by every [`GlobalClient::list`](crate::GlobalClient::list) call
#[derive(Clone)]
pub struct FanOutMetrics {
    list_calls: IntCounter,
    clusters_listed: IntCounter,
    objects_returned: IntCounter,
    cluster_errors: IntCounterVec,
    list_duration: Histogram,
}

impl FanOutMetrics {
    pub fn new() -> Result<Self> {
        Ok(Self {
            list_calls: IntCounter::new(
                "capi_global_client_list_calls_total",
                "Fan-out list calls",
            )?,
            clusters_listed: IntCounter::new(
                "capi_global_client_clusters_listed_total",
                "Member clusters listed successfully",
            )?,
            objects_returned: IntCounter::new(
                "capi_global_client_objects_returned_total",
                "Objects returned across all member clusters",
            )?,
            cluster_errors: IntCounterVec::new(
                Opts::new(
                    "capi_global_client_cluster_errors_total",
                    "Per-cluster list failures",
                ),
                &["kind"],
            )?,
            list_duration: Histogram::with_opts(HistogramOpts::new(
                "capi_global_client_list_duration_seconds",
                "Duration of fan-out list calls",
            ))?,
        })
    }

    /// Register all collectors on `registry`
    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.list_calls.clone()))?;
        registry.register(Box::new(self.clusters_listed.clone()))?;
        registry.register(Box::new(self.objects_returned.clone()))?;
        registry.register(Box::new(self.cluster_errors.clone()))?;
        registry.register(Box::new(self.list_duration.clone()))?;
        Ok(())
    }

    pub(crate) fn record_call(
        &self,
        clusters_listed: usize,
        objects: usize,
        error_kinds: impl IntoIterator<Item = &'static str>,
        elapsed: Duration,
    ) {
        self.list_calls.inc();
        self.clusters_listed.inc_by(clusters_listed as u64);
        self.objects_returned.inc_by(objects as u64);
        for kind in error_kinds {
            self.cluster_errors.with_label_values(&[kind]).inc();
        }
        self.list_duration.observe(elapsed.as_secs_f64());
    }

    pub fn list_calls(&self) -> u64 {
        self.list_calls.get()
    }

    pub fn objects_returned(&self) -> u64 {
        self.objects_returned.get()
    }

    pub fn cluster_errors(&self, kind: &str) -> u64 {
        self.cluster_errors.with_label_values(&[kind]).get()
    }
}

impl std::fmt::Debug for FanOutMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOutMetrics")
            .field("list_calls", &self.list_calls.get())
            .field("objects_returned", &self.objects_returned.get())
            .finish()
    }
}
