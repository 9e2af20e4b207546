use opbind_core::AttributeError;
use thiserror::Error;

/// Fatal resolution failures. All of them abort session construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("unsupported operator '{op_type}' (domain {domain}, opset {version})")]
    UnsupportedOperator {
        op_type: String,
        domain: String,
        version: u32,
    },
    #[error("invalid configuration for operator '{op_type}' on backend {backend}")]
    InvalidOperatorConfiguration {
        op_type: String,
        backend: String,
        #[source]
        source: AttributeError,
    },
    #[error("no opset imported for domain '{domain}' (operator '{op_type}')")]
    MissingOpsetImport { op_type: String, domain: String },
    #[error("session has been disposed")]
    SessionDisposed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("fallback backend '{name}' is the same instance as the primary backend")]
    FallbackIsPrimary { name: String },
    #[error("unknown backend '{name}'")]
    UnknownBackend { name: String },
    #[error("session has been disposed")]
    Disposed,
    #[error("unknown kernel id {0}")]
    UnknownKernel(usize),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("backend '{name}' is already registered")]
    DuplicateBackend { name: String },
}
