/// Soroban RPC client
/// JSON-RPC 2.0 over HTTP; transactions and ledger data travel as base64 XDR
use crate::backoff::{execute_with_backoff, ExponentialBackoff};
use crate::config::{NetworkConfig, MAINNET_RPC, TESTNET_RPC};
use crate::error::RpcError;
use crate::transaction::envelope_to_base64;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use soroban_spec_core::strkey;
use std::fmt;
use std::time::Duration;
use stellar_xdr::curr::{
    AccountId, LedgerEntryData, LedgerKey, LedgerKeyAccount, Limits, PublicKey, ReadXdr, ScVal,
    SorobanAuthorizationEntry, SorobanTransactionData, TransactionEnvelope, TransactionMeta,
    Uint256, WriteXdr,
};
use tracing::debug;

/// Decode a base64 XDR field of an RPC response
pub fn decode_xdr<T: ReadXdr>(xdr_base64: &str, what: &str) -> Result<T, RpcError> {
    let engine = base64::engine::general_purpose::STANDARD;
    let bytes = engine
        .decode(xdr_base64)
        .map_err(|e| RpcError::InvalidResponse(format!("invalid base64 in {}: {}", what, e)))?;
    T::from_xdr(bytes, Limits::none())
        .map_err(|e| RpcError::InvalidResponse(format!("invalid {} XDR: {}", what, e)))
}

pub fn encode_xdr<T: WriteXdr>(value: &T) -> Result<String, RpcError> {
    let engine = base64::engine::general_purpose::STANDARD;
    value
        .to_xdr(Limits::none())
        .map(|bytes| engine.encode(bytes))
        .map_err(|e| RpcError::InvalidResponse(format!("cannot encode XDR: {}", e)))
}

fn parse_fee(fee: &str) -> Result<i64, RpcError> {
    fee.parse::<i64>()
        .map_err(|e| RpcError::InvalidResponse(format!("invalid minResourceFee `{}`: {}", fee, e)))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateHostFunctionResult {
    #[serde(default)]
    pub auth: Vec<String>,
    pub xdr: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateCost {
    pub cpu_insns: String,
    pub mem_bytes: String,
}

/// Ledger entries a call touches that are archived and must be restored first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestorePreamble {
    pub transaction_data: String,
    pub min_resource_fee: String,
}

impl RestorePreamble {
    pub fn transaction_data(&self) -> Result<SorobanTransactionData, RpcError> {
        decode_xdr(&self.transaction_data, "restore transaction data")
    }

    pub fn min_resource_fee(&self) -> Result<i64, RpcError> {
        parse_fee(&self.min_resource_fee)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateTransactionResponse {
    #[serde(default)]
    pub transaction_data: Option<String>,
    #[serde(default)]
    pub min_resource_fee: Option<String>,
    #[serde(default)]
    pub results: Vec<SimulateHostFunctionResult>,
    #[serde(default)]
    pub cost: Option<SimulateCost>,
    #[serde(default)]
    pub restore_preamble: Option<RestorePreamble>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub latest_ledger: u32,
}

impl SimulateTransactionResponse {
    pub fn transaction_data(&self) -> Result<Option<SorobanTransactionData>, RpcError> {
        self.transaction_data
            .as_deref()
            .filter(|d| !d.is_empty())
            .map(|d| decode_xdr(d, "transaction data"))
            .transpose()
    }

    pub fn min_resource_fee(&self) -> Result<i64, RpcError> {
        self.min_resource_fee
            .as_deref()
            .map(parse_fee)
            .unwrap_or(Ok(0))
    }

    /// Authorization entries the invocation requires
    pub fn auth(&self) -> Result<Vec<SorobanAuthorizationEntry>, RpcError> {
        self.results
            .first()
            .map(|r| r.auth.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|a| decode_xdr(a, "authorization entry"))
            .collect()
    }

    pub fn return_value(&self) -> Result<Option<ScVal>, RpcError> {
        self.results
            .first()
            .map(|r| decode_xdr(&r.xdr, "return value"))
            .transpose()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendStatus {
    Pending,
    Duplicate,
    Error,
    TryAgainLater,
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendStatus::Pending => write!(f, "PENDING"),
            SendStatus::Duplicate => write!(f, "DUPLICATE"),
            SendStatus::Error => write!(f, "ERROR"),
            SendStatus::TryAgainLater => write!(f, "TRY_AGAIN_LATER"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTransactionResponse {
    pub status: SendStatus,
    pub hash: String,
    #[serde(default)]
    pub error_result_xdr: Option<String>,
    #[serde(default)]
    pub latest_ledger: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Success,
    Failed,
    NotFound,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Success => write!(f, "SUCCESS"),
            TransactionStatus::Failed => write!(f, "FAILED"),
            TransactionStatus::NotFound => write!(f, "NOT_FOUND"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTransactionResponse {
    pub status: TransactionStatus,
    #[serde(default)]
    pub result_xdr: Option<String>,
    #[serde(default)]
    pub result_meta_xdr: Option<String>,
    #[serde(default)]
    pub ledger: Option<u32>,
    #[serde(default)]
    pub latest_ledger: u32,
}

impl GetTransactionResponse {
    pub fn not_found() -> Self {
        GetTransactionResponse {
            status: TransactionStatus::NotFound,
            result_xdr: None,
            result_meta_xdr: None,
            ledger: None,
            latest_ledger: 0,
        }
    }

    /// Contract return value recorded in the result meta
    pub fn return_value(&self) -> Result<Option<ScVal>, RpcError> {
        let Some(meta) = self.result_meta_xdr.as_deref() else {
            return Ok(None);
        };
        let meta: TransactionMeta = decode_xdr(meta, "transaction meta")?;
        Ok(match meta {
            TransactionMeta::V3(m) => m.soroban_meta.map(|s| s.return_value),
            TransactionMeta::V4(m) => m.soroban_meta.and_then(|s| s.return_value),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryResult {
    pub key: String,
    pub xdr: String,
    #[serde(default)]
    pub last_modified_ledger_seq: Option<u32>,
    #[serde(default)]
    pub live_until_ledger_seq: Option<u32>,
}

impl LedgerEntryResult {
    pub fn data(&self) -> Result<LedgerEntryData, RpcError> {
        decode_xdr(&self.xdr, "ledger entry")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetLedgerEntriesResponse {
    #[serde(default)]
    pub entries: Vec<LedgerEntryResult>,
    #[serde(default)]
    pub latest_ledger: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSequence {
    pub account_id: String,
    pub sequence: i64,
}

/// The RPC calls an invocation needs
#[async_trait]
pub trait SorobanRpc: Send + Sync {
    async fn get_account(&self, account_id: &str) -> Result<AccountSequence, RpcError>;

    async fn simulate_transaction(
        &self,
        tx: &TransactionEnvelope,
    ) -> Result<SimulateTransactionResponse, RpcError>;

    async fn send_transaction(
        &self,
        tx: &TransactionEnvelope,
    ) -> Result<SendTransactionResponse, RpcError>;

    async fn get_transaction(&self, hash: &str) -> Result<GetTransactionResponse, RpcError>;

    async fn get_ledger_entries(
        &self,
        keys: &[LedgerKey],
    ) -> Result<GetLedgerEntriesResponse, RpcError>;

    async fn get_latest_ledger(&self) -> Result<u32, RpcError>;
}

/// Client for communicating with Soroban RPC
#[derive(Debug, Clone)]
pub struct SorobanRpcClient {
    pub endpoint: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl SorobanRpcClient {
    pub fn new(endpoint: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            endpoint: endpoint.to_string(),
            client,
            max_retries: 3,
        }
    }

    pub fn testnet() -> Self {
        Self::new(TESTNET_RPC)
    }

    pub fn mainnet() -> Self {
        Self::new(MAINNET_RPC)
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(&config.rpc_url)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// JSON-RPC call; idempotent reads retry transport failures with backoff
    async fn jsonrpc_call(&self, method: &str, params: Value, retry: bool) -> Result<Value, RpcError> {
        if !retry {
            return self.request(method, &params).await;
        }

        let params = &params;
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(2));
        execute_with_backoff(
            backoff,
            self.max_retries + 1,
            |e: &RpcError| e.is_retryable(),
            move || self.request(method, params),
        )
        .await
    }

    async fn request(&self, method: &str, params: &Value) -> Result<Value, RpcError> {
        let request_body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });
        debug!(method, endpoint = %self.endpoint, "Sending JSON-RPC request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout
                } else {
                    RpcError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(RpcError::RequestFailed(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(RpcError::RpcError(format!(
                "HTTP {}: {}",
                status,
                response.text().await.unwrap_or_default()
            )));
        }

        let result: Value = response
            .json()
            .await
            .map_err(|e| RpcError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = result.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(RpcError::RpcError(message));
        }

        result
            .get("result")
            .cloned()
            .ok_or_else(|| RpcError::InvalidResponse("No result in RPC response".to_string()))
    }

    async fn typed_call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        retry: bool,
    ) -> Result<T, RpcError> {
        let value = self.jsonrpc_call(method, params, retry).await?;
        serde_json::from_value::<T>(value)
            .map_err(|e| RpcError::InvalidResponse(format!("Failed to parse {} result: {}", method, e)))
    }
}

#[async_trait]
impl SorobanRpc for SorobanRpcClient {
    async fn get_account(&self, account_id: &str) -> Result<AccountSequence, RpcError> {
        let key = strkey::decode_account_id(account_id)
            .map_err(|e| RpcError::RequestFailed(format!("invalid account id {}: {}", account_id, e)))?;
        let ledger_key = LedgerKey::Account(LedgerKeyAccount {
            account_id: AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(key))),
        });

        let response = self.get_ledger_entries(&[ledger_key]).await?;
        let entry = response
            .entries
            .first()
            .ok_or_else(|| RpcError::RpcError(format!("account not found: {}", account_id)))?;

        match entry.data()? {
            LedgerEntryData::Account(account) => Ok(AccountSequence {
                account_id: account_id.to_string(),
                sequence: account.seq_num.0,
            }),
            other => Err(RpcError::InvalidResponse(format!(
                "expected an account entry, got {}",
                other.name()
            ))),
        }
    }

    async fn simulate_transaction(
        &self,
        tx: &TransactionEnvelope,
    ) -> Result<SimulateTransactionResponse, RpcError> {
        let transaction = envelope_to_base64(tx)
            .map_err(|e| RpcError::RequestFailed(e.to_string()))?;
        self.typed_call("simulateTransaction", json!({ "transaction": transaction }), false)
            .await
    }

    async fn send_transaction(
        &self,
        tx: &TransactionEnvelope,
    ) -> Result<SendTransactionResponse, RpcError> {
        let transaction = envelope_to_base64(tx)
            .map_err(|e| RpcError::RequestFailed(e.to_string()))?;
        self.typed_call("sendTransaction", json!({ "transaction": transaction }), false)
            .await
    }

    async fn get_transaction(&self, hash: &str) -> Result<GetTransactionResponse, RpcError> {
        self.typed_call("getTransaction", json!({ "hash": hash }), true)
            .await
    }

    async fn get_ledger_entries(
        &self,
        keys: &[LedgerKey],
    ) -> Result<GetLedgerEntriesResponse, RpcError> {
        let keys = keys.iter().map(encode_xdr).collect::<Result<Vec<_>, _>>()?;
        self.typed_call("getLedgerEntries", json!({ "keys": keys }), true)
            .await
    }

    async fn get_latest_ledger(&self) -> Result<u32, RpcError> {
        let response = self.jsonrpc_call("getLatestLedger", json!({}), true).await?;
        response
            .get("sequence")
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| RpcError::InvalidResponse("Invalid getLatestLedger response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = SorobanRpcClient::testnet();
        assert!(client.endpoint.contains("testnet"));
        let client = SorobanRpcClient::from_config(&NetworkConfig::mainnet());
        assert!(client.endpoint.contains("mainnet"));
    }

    #[test]
    fn test_parse_simulation_response() {
        let return_value = encode_xdr(&ScVal::U32(7)).unwrap();
        let response: SimulateTransactionResponse = serde_json::from_value(json!({
            "minResourceFee": "58181",
            "results": [{ "auth": [], "xdr": return_value }],
            "cost": { "cpuInsns": "1000", "memBytes": "2000" },
            "latestLedger": 1234
        }))
        .unwrap();

        assert_eq!(response.min_resource_fee().unwrap(), 58181);
        assert_eq!(response.return_value().unwrap(), Some(ScVal::U32(7)));
        assert!(response.auth().unwrap().is_empty());
        assert!(response.transaction_data().unwrap().is_none());
        assert!(response.restore_preamble.is_none());
    }

    #[test]
    fn test_parse_send_and_get_status() {
        let send: SendTransactionResponse = serde_json::from_value(json!({
            "status": "TRY_AGAIN_LATER",
            "hash": "abcd",
            "latestLedger": 10
        }))
        .unwrap();
        assert_eq!(send.status, SendStatus::TryAgainLater);

        let get: GetTransactionResponse = serde_json::from_value(json!({
            "status": "NOT_FOUND",
            "latestLedger": 10
        }))
        .unwrap();
        assert_eq!(get.status, TransactionStatus::NotFound);
        assert_eq!(get.return_value().unwrap(), None);
    }

    #[test]
    fn test_invalid_fee_is_reported() {
        let response = SimulateTransactionResponse {
            min_resource_fee: Some("lots".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            response.min_resource_fee(),
            Err(RpcError::InvalidResponse(_))
        ));
    }
}
