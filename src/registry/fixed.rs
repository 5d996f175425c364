//! Fixed cluster list

use crate::domain::cluster::ClusterIdentity;
use crate::domain::ports::ClusterRegistry;
use crate::error::Result;
use async_trait::async_trait;

/// Registry that always returns the same clusters, in the given order
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    clusters: Vec<ClusterIdentity>,
}

impl StaticRegistry {
    pub fn new(clusters: Vec<ClusterIdentity>) -> Self {
        Self { clusters }
    }
}

impl FromIterator<ClusterIdentity> for StaticRegistry {
    fn from_iter<I: IntoIterator<Item = ClusterIdentity>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[async_trait]
impl ClusterRegistry for StaticRegistry {
    async fn list_clusters(&self) -> Result<Vec<ClusterIdentity>> {
        Ok(self.clusters.clone())
    }
}
