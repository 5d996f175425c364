//! Kubeconfig Secret Connector
//!
//! Connects to a CAPI member cluster using the admin kubeconfig CAPI keeps
//! in the management cluster as `<cluster>-kubeconfig` (key `value`) in
//! the cluster's namespace.

use crate::domain::cluster::ClusterIdentity;
use crate::domain::ports::{
    ClusterConnector, ClusterHandle, ClusterHandleRef, ListOptions, ObjectContainer,
};
use crate::error::{Error, Result};
use crate::tracker::index::IndexSet;
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::DynamicObject;
use kube::{Client, Config};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the kubeconfig connector
#[derive(Debug, Clone)]
pub struct KubeconfigConnectorConfig {
    /// Key of the kubeconfig inside the CAPI secret
    pub secret_key: String,
    /// TCP connect timeout for member cluster clients
    pub connect_timeout: Duration,
    /// Read timeout for member cluster clients
    pub read_timeout: Duration,
    /// Wait for the member API server to answer before handing out a handle
    pub probe_api_server: bool,
    /// First retry delay for transient failures
    pub retry_initial_interval: Duration,
    /// Give up retrying after this long
    pub retry_max_elapsed: Duration,
}

impl Default for KubeconfigConnectorConfig {
    fn default() -> Self {
        Self {
            secret_key: "value".to_string(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            probe_api_server: true,
            retry_initial_interval: Duration::from_millis(250),
            retry_max_elapsed: Duration::from_secs(10),
        }
    }
}

// =============================================================================
// Kubeconfig Connector
// =============================================================================

/// Builds member cluster clients from CAPI kubeconfig secrets
pub struct KubeconfigConnector {
    management: Client,
    config: KubeconfigConnectorConfig,
}

impl KubeconfigConnector {
    /// Create a connector reading secrets through the management cluster client
    pub fn new(management: Client) -> Self {
        Self::with_config(management, KubeconfigConnectorConfig::default())
    }

    pub fn with_config(management: Client, config: KubeconfigConnectorConfig) -> Self {
        Self { management, config }
    }

    async fn fetch_kubeconfig(&self, cluster: &ClusterIdentity) -> Result<Kubeconfig> {
        let secrets: Api<Secret> = Api::namespaced(self.management.clone(), &cluster.namespace);
        let name = cluster.kubeconfig_secret_name();

        let secret = match secrets.get(&name).await {
            Ok(secret) => secret,
            Err(kube::Error::Api(err)) if err.code == 404 => {
                return Err(Error::KubeconfigUnavailable {
                    namespace: cluster.namespace.clone(),
                    name,
                    reason: "secret not found".into(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let data = secret
            .data
            .as_ref()
            .and_then(|d| d.get(&self.config.secret_key))
            .ok_or_else(|| Error::KubeconfigUnavailable {
                namespace: cluster.namespace.clone(),
                name: name.clone(),
                reason: format!("missing key {:?}", self.config.secret_key),
            })?;

        parse_kubeconfig(cluster, &data.0)
    }

    async fn build_client(&self, cluster: &ClusterIdentity, kubeconfig: Kubeconfig) -> Result<Client> {
        let mut config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| Error::KubeconfigInvalid {
                cluster: cluster.to_string(),
                reason: e.to_string(),
            })?;
        config.connect_timeout = Some(self.config.connect_timeout);
        config.read_timeout = Some(self.config.read_timeout);

        let client = Client::try_from(config)?;

        if self.config.probe_api_server {
            let version = client.apiserver_version().await?;
            debug!(cluster = %cluster, version = %version.git_version, "Member API server reachable");
        }

        Ok(client)
    }

    async fn connect_once(&self, cluster: &ClusterIdentity) -> Result<Client> {
        let kubeconfig = self.fetch_kubeconfig(cluster).await?;
        self.build_client(cluster, kubeconfig).await
    }
}

#[async_trait]
impl ClusterConnector for KubeconfigConnector {
    async fn connect(
        &self,
        cluster: &ClusterIdentity,
        indexes: Arc<IndexSet>,
    ) -> Result<ClusterHandleRef> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.retry_initial_interval)
            .with_max_elapsed_time(Some(self.config.retry_max_elapsed))
            .build();

        let client = backoff::future::retry(policy, move || async move {
            self.connect_once(cluster).await.map_err(|e| {
                if e.is_transient() {
                    debug!(cluster = %cluster, error = %e, "Transient connection failure, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await?;

        info!(cluster = %cluster, "Connected to member cluster");
        Ok(Arc::new(KubeClusterHandle::new(cluster.clone(), client, indexes)))
    }
}

/// Parse raw kubeconfig bytes taken from a CAPI secret
pub fn parse_kubeconfig(cluster: &ClusterIdentity, raw: &[u8]) -> Result<Kubeconfig> {
    let text = std::str::from_utf8(raw).map_err(|e| Error::KubeconfigInvalid {
        cluster: cluster.to_string(),
        reason: format!("not valid UTF-8: {}", e),
    })?;

    serde_yaml::from_str(text).map_err(|e| Error::KubeconfigInvalid {
        cluster: cluster.to_string(),
        reason: format!("invalid YAML: {}", e),
    })
}

// =============================================================================
// Kube Cluster Handle
// =============================================================================

/// Handle onto a member cluster's API server
pub struct KubeClusterHandle {
    cluster: ClusterIdentity,
    client: Client,
    indexes: Arc<IndexSet>,
}

impl std::fmt::Debug for KubeClusterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterHandle")
            .field("cluster", &self.cluster)
            .field("indexes", &self.indexes.len())
            .finish()
    }
}

impl KubeClusterHandle {
    pub fn new(cluster: ClusterIdentity, client: Client, indexes: Arc<IndexSet>) -> Self {
        Self {
            cluster,
            client,
            indexes,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ClusterHandle for KubeClusterHandle {
    fn cluster(&self) -> &ClusterIdentity {
        &self.cluster
    }

    async fn list(&self, container: &mut dyn ObjectContainer, options: &ListOptions) -> Result<()> {
        let resource = container.api_resource();
        self.indexes.ensure_indexed(&resource, &options.fields)?;

        let api: Api<DynamicObject> = match &options.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        };

        let mut params = ListParams::default();
        if let Some(selector) = &options.label_selector {
            params = params.labels(selector);
        }

        let list = api.list(&params).await?;
        debug!(
            cluster = %self.cluster,
            kind = %resource.kind,
            fetched = list.items.len(),
            "Listed objects"
        );

        let objects = self.indexes.filter(&resource, list.items, &options.fields)?;
        container.fill(objects)
    }
}
