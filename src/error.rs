//! Error types.

use thiserror::Error;

/// Reasons an endpoint cannot be used.
///
/// The messages are shown verbatim by the administrative endpoint check.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("host must not be empty")]
    EmptyHost,

    #[error("unable to resolve host {0}")]
    UnresolvableHost(String),

    #[error("port {0} is out of range, expected 1-65535")]
    InvalidPort(i64),
}

/// Failures inside a transport. These are logged and dropped at the
/// transport boundary and never reach the registry.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind udp socket: {0}")]
    Bind(#[source] std::io::Error),

    #[error("unable to resolve {0}: {1}")]
    Resolve(String, String),

    #[error("failed to send datagram: {0}")]
    Send(#[source] std::io::Error),

    #[error("no transport available for {0} endpoints")]
    UnsupportedVariant(&'static str),
}
