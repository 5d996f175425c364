//! CAPI Global Client CLI
//!
//! Lists one resource kind across every Cluster API member cluster and
//! prints the cluster-tagged result.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │  capi-global-client --kind Pod --field spec.nodeName=worker-1               │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────────────┐  ┌─────────────────────┐  │
//! │  │  CAPI Registry  │  │   Kubeconfig Connector  │  │    Dynamic List     │  │
//! │  │  or --cluster   │  │   (<name>-kubeconfig)   │  │  (--api-version)    │  │
//! │  └────────┬────────┘  └────────────┬────────────┘  └──────────┬──────────┘  │
//! │           └────────────────────────┼──────────────────────────┘             │
//! │                        ┌───────────┴───────────┐                            │
//! │                        │     GlobalClient      │                            │
//! │                        └───────────┬───────────┘                            │
//! │                              table / json                                   │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```

use clap::{Parser, ValueEnum};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Client, Config, ResourceExt};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use capi_global_client::domain::ports::ClusterRegistryRef;
use capi_global_client::{
    CapiClusterRegistry, CapiRegistryConfig, ClusterIdentity, ClusterTracker, DynamicList, Error,
    FieldIndex, GlobalClient, GlobalClientConfig, KubeconfigConnector, ListOptions, ListOutcome,
    Result, StaticRegistry, TrackerConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// CAPI Global Client - list objects across every Cluster API member cluster
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// API version of the listed kind (e.g. `v1`, `apps/v1`)
    #[arg(long, default_value = "v1")]
    api_version: String,

    /// Kind to list
    #[arg(long, default_value = "Pod")]
    kind: String,

    /// Plural resource name, when it is not the kind's regular plural
    #[arg(long)]
    plural: Option<String>,

    /// Field filter `path=value`; repeatable, each path gets a field index
    #[arg(long = "field", value_name = "PATH=VALUE")]
    fields: Vec<String>,

    /// Only list objects in this namespace
    #[arg(long, short = 'n')]
    namespace: Option<String>,

    /// Label selector for listed objects
    #[arg(long, short = 'l')]
    selector: Option<String>,

    /// Explicit member cluster `namespace/name`; skips CAPI discovery
    #[arg(long = "cluster", value_name = "NAMESPACE/NAME")]
    clusters: Vec<String>,

    /// Served cluster.x-k8s.io version
    #[arg(long, env = "CAPI_VERSION", default_value = "v1beta1")]
    capi_version: String,

    /// Only discover clusters in this namespace
    #[arg(long, env = "CAPI_NAMESPACE")]
    capi_namespace: Option<String>,

    /// Label selector for CAPI Cluster objects
    #[arg(long, env = "CAPI_SELECTOR")]
    capi_selector: Option<String>,

    /// Skip clusters whose control plane is not ready
    #[arg(long, env = "CAPI_READY_ONLY")]
    ready_only: bool,

    /// Member clusters listed at the same time
    #[arg(long, env = "MAX_CONCURRENCY", default_value = "8")]
    max_concurrency: usize,

    /// Deadline for connecting to and listing one cluster, in seconds
    #[arg(long, env = "CLUSTER_TIMEOUT", default_value = "30")]
    cluster_timeout_secs: u64,

    /// Deadline for establishing one connection, in seconds
    #[arg(long, env = "CONNECT_TIMEOUT", default_value = "20")]
    connect_timeout_secs: u64,

    /// Management cluster kubeconfig (defaults to in-cluster or ~/.kube/config)
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', value_enum, default_value = "table")]
    output: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    info!("Starting CAPI Global Client");
    info!("  Version: {}", capi_global_client::VERSION);
    info!("  Kind: {} {}", args.api_version, args.kind);

    let resource = api_resource(&args);
    let options = list_options(&args)?;

    let management = management_client(&args).await?;

    let registry: ClusterRegistryRef = if args.clusters.is_empty() {
        Arc::new(CapiClusterRegistry::with_config(
            management.clone(),
            CapiRegistryConfig {
                version: args.capi_version.clone(),
                namespace: args.capi_namespace.clone(),
                label_selector: args.capi_selector.clone(),
                ready_only: args.ready_only,
            },
        ))
    } else {
        let clusters = args
            .clusters
            .iter()
            .map(|c| c.parse::<ClusterIdentity>())
            .collect::<Result<Vec<_>>>()?;
        Arc::new(StaticRegistry::new(clusters))
    };

    let tracker = ClusterTracker::builder(Arc::new(KubeconfigConnector::new(management)))
        .indexes(field_indexes(&resource, &options))
        .config(TrackerConfig {
            connect_timeout: Duration::from_secs(args.connect_timeout_secs),
            ..Default::default()
        })
        .build()?;

    let client = GlobalClient::new(
        registry,
        tracker,
        GlobalClientConfig {
            max_concurrency: args.max_concurrency,
            cluster_timeout: Duration::from_secs(args.cluster_timeout_secs),
            ..Default::default()
        },
    );

    let outcome = client.list(&DynamicList::new(resource), &options).await?;

    match args.output {
        OutputFormat::Table => print_table(&outcome),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcome.items())?),
    }

    for (cluster, error) in outcome.errors() {
        warn!(cluster = %cluster, kind = error.kind_label(), "{}", error);
    }
    if !outcome.is_complete() {
        eprintln!(
            "{} of {} clusters failed; results are partial",
            outcome.error_count(),
            outcome.clusters_total()
        );
    }

    Ok(())
}

// =============================================================================
// Request Setup
// =============================================================================

fn api_resource(args: &Args) -> ApiResource {
    let (group, version) = args
        .api_version
        .split_once('/')
        .unwrap_or(("", args.api_version.as_str()));
    let gvk = GroupVersionKind::gvk(group, version, &args.kind);

    match &args.plural {
        Some(plural) => ApiResource::from_gvk_with_plural(&gvk, plural),
        None => ApiResource::from_gvk(&gvk),
    }
}

fn list_options(args: &Args) -> Result<ListOptions> {
    let mut options = ListOptions::default();
    for field in &args.fields {
        let (path, value) = field.split_once('=').ok_or_else(|| {
            Error::Configuration(format!("field filter {:?} is not PATH=VALUE", field))
        })?;
        options = options.matching_field(path.trim(), value.trim());
    }
    if let Some(ns) = &args.namespace {
        options = options.in_namespace(ns.clone());
    }
    if let Some(selector) = &args.selector {
        options = options.with_labels(selector.clone());
    }
    Ok(options)
}

/// Name and namespace are always indexed, plus every requested field path
fn field_indexes(resource: &ApiResource, options: &ListOptions) -> Vec<FieldIndex> {
    let builtin = ["metadata.name", "metadata.namespace"];
    let extra: BTreeSet<&str> = options
        .fields
        .keys()
        .map(String::as_str)
        .filter(|f| !builtin.contains(f))
        .collect();

    [
        FieldIndex::metadata_name(resource),
        FieldIndex::metadata_namespace(resource),
    ]
    .into_iter()
    .chain(extra.into_iter().map(|path| FieldIndex::json_path(resource, path)))
    .collect()
}

async fn management_client(args: &Args) -> Result<Client> {
    let Some(path) = &args.kubeconfig else {
        return Ok(Client::try_default().await?);
    };

    let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
        Error::Configuration(format!("reading kubeconfig {}: {}", path.display(), e))
    })?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::Configuration(format!("loading kubeconfig {}: {}", path.display(), e)))?;

    Ok(Client::try_from(config)?)
}

// =============================================================================
// Output
// =============================================================================

fn print_table(outcome: &ListOutcome<DynamicObject>) {
    let rows: Vec<(String, String, String)> = outcome
        .iter()
        .map(|o| {
            (
                o.cluster().to_string(),
                o.namespace().unwrap_or_default(),
                o.name_any(),
            )
        })
        .collect();

    let width = |header: &str, col: fn(&(String, String, String)) -> &String| {
        rows.iter().map(|r| col(r).len()).chain([header.len()]).max().unwrap_or(0)
    };
    let w_cluster = width("CLUSTER", |r| &r.0);
    let w_namespace = width("NAMESPACE", |r| &r.1);

    println!("{:w_cluster$}  {:w_namespace$}  NAME", "CLUSTER", "NAMESPACE");
    for (cluster, namespace, name) in &rows {
        println!("{:w_cluster$}  {:w_namespace$}  {}", cluster, namespace, name);
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "tower=warn"] {
        let directive = directive
            .parse()
            .map_err(|e| Error::Configuration(format!("log directive {}: {}", directive, e)))?;
        filter = filter.add_directive(directive);
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}
