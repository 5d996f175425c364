//! Error types for the global client
//!
//! Errors fall into two scopes: call-level errors abort a fan-out list,
//! cluster-level errors are recorded against one member cluster and the
//! fan-out carries on with the rest.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the global client
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Registry Errors
    // =========================================================================
    #[error("Cluster registry unavailable: {reason}")]
    RegistryUnavailable { reason: String },

    #[error("Invalid cluster identity: {0}")]
    InvalidClusterIdentity(String),

    // =========================================================================
    // Per-Cluster Errors
    // =========================================================================
    #[error("Connection to cluster {cluster} failed: {source}")]
    Connection {
        cluster: String,
        #[source]
        source: Box<Error>,
    },

    #[error("List on cluster {cluster} failed: {source}")]
    List {
        cluster: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Cluster {cluster} did not answer within {timeout:?}")]
    ClusterTimeout { cluster: String, timeout: Duration },

    // =========================================================================
    // Connection Causes
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Kubeconfig secret {namespace}/{name} unavailable: {reason}")]
    KubeconfigUnavailable {
        namespace: String,
        name: String,
        reason: String,
    },

    #[error("Kubeconfig for cluster {cluster} is invalid: {reason}")]
    KubeconfigInvalid { cluster: String, reason: String },

    // =========================================================================
    // List Causes
    // =========================================================================
    #[error("No field index registered for {kind} field {field}")]
    IndexNotRegistered { kind: String, field: String },

    #[error("Index for {kind} field {field} registered twice")]
    DuplicateIndex { kind: String, field: String },

    #[error("Cannot decode {kind} object: {reason}")]
    ObjectDecode { kind: String, reason: String },

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    // =========================================================================
    // Metrics / IO Errors
    // =========================================================================
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether an error aborts the whole fan-out or only one cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// The fan-out call fails, nothing is listed
    Call,
    /// Recorded against a single cluster, the fan-out continues
    Cluster,
}

impl Error {
    /// Wrap any error as a connection failure for `cluster`
    pub fn connection(cluster: impl std::fmt::Display, source: Error) -> Self {
        match source {
            e @ (Error::Connection { .. } | Error::ClusterTimeout { .. }) => e,
            other => Error::Connection {
                cluster: cluster.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Wrap any error as a list failure for `cluster`
    pub fn list(cluster: impl std::fmt::Display, source: Error) -> Self {
        match source {
            e @ (Error::List { .. } | Error::ClusterTimeout { .. }) => e,
            other => Error::List {
                cluster: cluster.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Determine the scope of this error
    pub fn scope(&self) -> ErrorScope {
        match self {
            Error::Connection { .. } | Error::List { .. } | Error::ClusterTimeout { .. } => {
                ErrorScope::Cluster
            }
            _ => ErrorScope::Call,
        }
    }

    /// Check if retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(resp)) => resp.code == 429 || resp.code >= 500,
            // Credentials, config and TLS setup fail the same way on every attempt
            Error::Kube(
                kube::Error::Auth(_)
                | kube::Error::InferConfig(_)
                | kube::Error::RustlsTls(_)
                | kube::Error::BuildRequest(_)
                | kube::Error::SerdeError(_),
            ) => false,
            Error::Kube(_) | Error::ClusterTimeout { .. } => true,
            Error::Connection { source, .. } | Error::List { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Short label used for metrics and log fields
    pub fn kind_label(&self) -> &'static str {
        match self {
            Error::RegistryUnavailable { .. } => "registry",
            Error::Connection { .. } => "connection",
            Error::List { .. } => "list",
            Error::ClusterTimeout { .. } => "timeout",
            Error::Configuration(_) | Error::InvalidClusterIdentity(_) => "configuration",
            _ => "internal",
        }
    }

    /// The innermost cause of a wrapped per-cluster error
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Connection { source, .. } | Error::List { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type alias for the global client
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_error_scopes() {
        let err = Error::RegistryUnavailable {
            reason: "forbidden".into(),
        };
        assert_eq!(err.scope(), ErrorScope::Call);

        let err = Error::connection("default/a", Error::Internal("boom".into()));
        assert_eq!(err.scope(), ErrorScope::Cluster);
        assert_eq!(err.kind_label(), "connection");

        let err = Error::ClusterTimeout {
            cluster: "default/a".into(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(err.scope(), ErrorScope::Cluster);
    }

    #[test]
    fn test_wrapping_is_not_nested() {
        let inner = Error::list("default/a", Error::Internal("x".into()));
        let outer = Error::list("default/a", inner);
        assert_matches!(&outer, Error::List { source, .. } => {
            assert_matches!(**source, Error::Internal(_));
        });

        let timeout = Error::ClusterTimeout {
            cluster: "default/a".into(),
            timeout: Duration::from_millis(10),
        };
        assert_matches!(Error::connection("default/a", timeout), Error::ClusterTimeout { .. });
    }

    #[test]
    fn test_root_cause_and_transience() {
        let err = Error::list(
            "default/a",
            Error::IndexNotRegistered {
                kind: "Pod".into(),
                field: "spec.nodeName".into(),
            },
        );
        assert_matches!(err.root_cause(), Error::IndexNotRegistered { .. });
        assert!(!err.is_transient());

        let err = Error::connection(
            "default/a",
            Error::KubeconfigUnavailable {
                namespace: "default".into(),
                name: "a-kubeconfig".into(),
                reason: "not found".into(),
            },
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn test_kube_error_transience() {
        let unavailable = Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".into(),
            message: "etcdserver: leader changed".into(),
            reason: "ServiceUnavailable".into(),
            code: 503,
        }));
        assert!(unavailable.is_transient());

        let forbidden = Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".into(),
            message: "secrets is forbidden".into(),
            reason: "Forbidden".into(),
            code: 403,
        }));
        assert!(!forbidden.is_transient());

        let garbled = serde_json::from_str::<u32>("not-json").unwrap_err();
        let err = Error::connection("default/a", Error::Kube(kube::Error::SerdeError(garbled)));
        assert!(!err.is_transient());
    }
}
