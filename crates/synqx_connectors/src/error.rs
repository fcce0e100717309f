//! `ConnectorError`: the one error type every capability trait method
//! returns. Kept flat rather than per-capability so the registry and pool
//! don't need to know which capabilities a given connector implements to
//! propagate a failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("unknown connector kind '{0}'")]
    UnknownKind(String),
    #[error("connector '{kind}' does not implement capability '{capability}'")]
    UnsupportedCapability { kind: String, capability: &'static str },
    #[error("invalid config for connector '{kind}': {reason}")]
    InvalidConfig { kind: String, reason: String },
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("query failed: {0}")]
    QueryFailed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

pub type ConnectorResult<T> = std::result::Result<T, ConnectorError>;
