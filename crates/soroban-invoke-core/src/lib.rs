//! soroban-invoke-core: Contract invocation over Soroban RPC
//!
//! Builds, simulates, signs, submits and polls transactions that call a
//! contract, with arguments and results converted through the contract's
//! published interface.

pub mod assembler;
pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod keypair;
pub mod rpc;
pub mod transaction;

pub use assembler::{AssembledTransaction, InvocationState, SimulationOutcome, Transition};
pub use client::{fetch_contract_wasm, ContractClient};
pub use config::{ClientOptions, MethodOptions, Network, NetworkConfig, PollConfig};
pub use error::{ConfigError, InvokeError, RpcError};
pub use keypair::Keypair;
pub use rpc::{
    AccountSequence, GetLedgerEntriesResponse, GetTransactionResponse, LedgerEntryResult,
    RestorePreamble, SendStatus, SendTransactionResponse, SimulateTransactionResponse, SorobanRpc,
    SorobanRpcClient, TransactionStatus,
};
pub use transaction::sign_authorization_entry;

pub use soroban_spec_core;
