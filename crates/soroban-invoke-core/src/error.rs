/// Error types for RPC transport, configuration and invocation
use soroban_spec_core::{ParseError, SpecError, StrkeyError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),
    #[error("RPC returned error: {0}")]
    RpcError(String),
    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
    #[error("Network timeout")]
    Timeout,
}

impl RpcError {
    /// Transport-level failures worth retrying for idempotent reads
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::RequestFailed(_) | RpcError::Timeout)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid network: {0}")]
    InvalidNetwork(String),
    #[error("Missing environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Invocation failures. Statuses reported by the network are returned as
/// data; only transport, timeout, signing and state errors surface here.
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("transport error: {0}")]
    Transport(#[from] RpcError),
    #[error(transparent)]
    Strkey(#[from] StrkeyError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("simulation failed: {0}")]
    SimulationFailed(String),
    #[error("archived ledger entries must be restored before this call")]
    RestoreRequired,
    #[error("state restoration failed: {0}")]
    RestoreFailed(String),
    #[error("transaction cannot be signed: {0}")]
    NotSignable(String),
    #[error("transaction {hash} still pending after {waited_secs}s")]
    Timeout { hash: String, waited_secs: u64 },
    #[error("transaction {hash} failed")]
    TransactionFailed {
        hash: String,
        result_xdr: Option<String>,
    },
    #[error("transaction {hash} rejected with status {status}")]
    SubmissionRejected { status: String, hash: String },
    #[error("cannot {action} in state {state}")]
    InvalidState { state: String, action: String },
    #[error("xdr error: {0}")]
    Xdr(String),
}

impl From<stellar_xdr::curr::Error> for InvokeError {
    fn from(e: stellar_xdr::curr::Error) -> Self {
        InvokeError::Xdr(e.to_string())
    }
}
