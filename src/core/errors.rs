// src/core/errors.rs

//! Error types for the three component boundaries (attribute aggregator,
//! action executor, IPC proxy) plus a crate-level union for the binary.

use std::sync::Arc;
use thiserror::Error;

/// Errors a configuration-store client reports back to a caller. Mirrors the
/// error codes named in the external-interfaces contract: `not-found`,
/// `diff-failed`, `timed-out`, `not-connected`, `generic-failure`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigStoreError {
    #[error("not-found")]
    NotFound,
    #[error("diff-failed")]
    DiffFailed,
    #[error("election-in-progress")]
    ElectionInProgress,
    #[error("missing-section")]
    MissingSection,
    #[error("timed-out")]
    TimedOut,
    #[error("not-connected")]
    NotConnected,
    #[error("generic-failure: {0}")]
    GenericFailure(String),
}

impl ConfigStoreError {
    /// Expected/benign errors that §4.1 says should be logged and retried by
    /// the next converge rather than reported as hard failures.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConfigStoreError::DiffFailed
                | ConfigStoreError::ElectionInProgress
                | ConfigStoreError::MissingSection
        )
    }
}

/// Errors surfaced by the attribute aggregator (Component A).
#[derive(Error, Debug, Clone)]
pub enum AttrdError {
    #[error("unknown attribute '{0}'")]
    UnknownAttribute(String),

    #[error("peer '{0}' is not a known cluster node")]
    UnknownPeer(String),

    #[error("configuration store error: {0}")]
    Store(#[from] ConfigStoreError),

    #[error("cluster bus error: {0}")]
    Bus(String),

    #[error("invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("invalid value expansion '{0}'")]
    InvalidExpansion(String),
}

/// Errors surfaced by the action executor (Component B).
#[derive(Error, Debug, Clone)]
pub enum ExecutorError {
    #[error("resource id must not be empty")]
    EmptyResourceId,

    #[error("class must not be empty")]
    EmptyClass,

    #[error("operation must not be empty")]
    EmptyOperation,

    #[error("agent must not be empty")]
    EmptyAgent,

    #[error("class '{0}' requires a non-empty provider")]
    MissingProvider(String),

    #[error("unknown class '{0}'")]
    UnknownClass(String),

    #[error("no action with identity '{0}' is tracked")]
    UnknownIdentity(String),

    #[error("could not fork: {0}")]
    CouldNotFork(Arc<std::io::Error>),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for ExecutorError {
    fn from(e: std::io::Error) -> Self {
        ExecutorError::CouldNotFork(Arc::new(e))
    }
}

/// Errors surfaced by the IPC proxy multiplexer (Component C).
#[derive(Error, Debug, Clone)]
pub enum ProxyError {
    #[error("no session with id '{0}'")]
    UnknownSession(String),

    #[error("session '{0}' targets the controller and must not re-enter itself")]
    LocalShortcutLoop(String),

    #[error("local connection for session '{0}' is dead")]
    ConnectionDead(String),

    #[error("request to local service timed out")]
    TimedOut,

    #[error("invalid protocol operation: {0}")]
    InvalidOp(String),
}

/// Crate-level union of the three component error types, used at the
/// binary's top level where `anyhow::Result` ultimately bottoms out.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error(transparent)]
    Attrd(#[from] AttrdError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error(transparent)]
    Proxy(#[from] ProxyError),
    #[error("configuration error: {0}")]
    Config(String),
}
