//! Error types for kube-gateway-dns.

use thiserror::Error;

/// Plugin identifier, used to correlate log lines and wrapped errors.
pub const PLUGIN_NAME: &str = "kube-gateway-dns";

/// Errors that can occur in the DNS gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A zone transfer was requested for a zone this instance does not serve
    #[error("not authoritative for zone {0}")]
    NotAuthoritative(String),

    /// Indexer layer has not completed its initial synchronization
    #[error("kube-gateway-dns: could not sync required resources")]
    NotReady,
}
