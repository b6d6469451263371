/// Typed client for one deployed contract
/// Loads the contract interface and turns method calls into transactions
use crate::assembler::{AssembledTransaction, SimulationOutcome};
use crate::config::{ClientOptions, MethodOptions};
use crate::error::{InvokeError, RpcError};
use crate::rpc::{SorobanRpc, SorobanRpcClient, TransactionStatus};
use crate::transaction::{create_contract_op, derive_contract_id, sha256, upload_wasm_op};
use soroban_spec_core::{decode_scval_native, strkey, ContractSpec, NativeValue, SpecError, CONSTRUCTOR_FN};
use std::sync::Arc;
use stellar_xdr::curr::{
    ContractDataDurability, ContractExecutable, Hash, LedgerEntryData, LedgerKey,
    LedgerKeyContractCode, LedgerKeyContractData, ScVal,
};
use tracing::{debug, info, warn};

pub struct ContractClient<R: SorobanRpc = SorobanRpcClient> {
    options: ClientOptions,
    rpc: Arc<R>,
    spec: ContractSpec,
}

impl ContractClient<SorobanRpcClient> {
    /// Client for `options.contract_id` using the configured RPC endpoint
    pub async fn for_contract(options: ClientOptions) -> Result<Self, InvokeError> {
        let rpc = Arc::new(SorobanRpcClient::from_config(&options.network));
        Self::for_contract_with(options, rpc).await
    }
}

impl<R: SorobanRpc> ContractClient<R> {
    /// Fetch the deployed contract image over `rpc` and build the client
    /// from its interface
    pub async fn for_contract_with(options: ClientOptions, rpc: Arc<R>) -> Result<Self, InvokeError> {
        let wasm = fetch_contract_wasm(rpc.as_ref(), &options.contract_id).await?;
        Self::from_wasm(options, rpc, &wasm)
    }

    pub fn from_wasm(options: ClientOptions, rpc: Arc<R>, wasm: &[u8]) -> Result<Self, InvokeError> {
        let spec = ContractSpec::from_wasm(wasm)?;
        Ok(Self::with_spec(options, rpc, spec))
    }

    pub fn with_spec(options: ClientOptions, rpc: Arc<R>, spec: ContractSpec) -> Self {
        debug!(
            contract_id = %options.contract_id,
            functions = spec.functions().count(),
            "Contract client ready"
        );
        ContractClient { options, rpc, spec }
    }

    pub fn spec(&self) -> &ContractSpec {
        &self.spec
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Build (and by default simulate) a call without sending it, for flows
    /// where other parties sign authorization entries first
    pub async fn build_invoke<K: AsRef<str>>(
        &self,
        method: &str,
        args: &[(K, NativeValue)],
        options: MethodOptions,
    ) -> Result<AssembledTransaction<R>, InvokeError> {
        AssembledTransaction::build_invocation(
            self.rpc.clone(),
            &self.options,
            options,
            &self.spec,
            method,
            args,
        )
        .await
    }

    /// Call `method` and decode its return value. Read calls are answered
    /// from the simulation without submitting anything.
    pub async fn invoke<K: AsRef<str>>(
        &self,
        method: &str,
        args: &[(K, NativeValue)],
        options: MethodOptions,
    ) -> Result<NativeValue, InvokeError> {
        let mut assembled = self.build_invoke(method, args, options).await?;
        ensure_simulated(&assembled)?;

        let submitted = !assembled.is_read_call() || options.force;
        if submitted {
            send_and_confirm(&mut assembled, options.force).await?;
        } else {
            debug!(method, "Read call answered by simulation");
        }

        let Some(value) = assembled.result()? else {
            return Ok(NativeValue::Null);
        };
        match self.spec.func_res_to_native(method, &value) {
            Ok(native) => Ok(native),
            // A confirmed write is never reported as failed
            Err(e) if submitted => {
                warn!(method, error = %e, "Return value does not match the declared output, decoding untyped");
                Ok(decode_scval_native(&value))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Upload contract code; returns its hash in hex
    pub async fn install(&self, wasm: &[u8], options: MethodOptions) -> Result<String, InvokeError> {
        let mut assembled =
            AssembledTransaction::build(self.rpc.clone(), &self.options, options, upload_wasm_op(wasm)?)
                .await?;
        ensure_simulated(&assembled)?;
        send_and_confirm(&mut assembled, options.force).await?;

        let wasm_hash = hex::encode(sha256(wasm));
        info!(wasm_hash = %wasm_hash, "Contract code installed");
        Ok(wasm_hash)
    }

    /// Create a contract from installed code. Constructor arguments are
    /// encoded against the contract's `__constructor`; without a salt a
    /// random one is used. Returns the new contract id (C...).
    pub async fn deploy<K: AsRef<str>>(
        &self,
        wasm_hash: &str,
        constructor_args: &[(K, NativeValue)],
        salt: Option<[u8; 32]>,
        options: MethodOptions,
    ) -> Result<String, InvokeError> {
        let wasm_hash = parse_wasm_hash(wasm_hash)?;
        let salt = salt.unwrap_or_else(rand::random);
        let constructor_args = if self.spec.has_function(CONSTRUCTOR_FN) || !constructor_args.is_empty() {
            self.spec.func_args_to_xdr(CONSTRUCTOR_FN, constructor_args)?
        } else {
            Vec::new()
        };

        let deployer = strkey::parse_sc_address(&self.options.source_account)?;
        let operation = create_contract_op(deployer.clone(), wasm_hash, salt, constructor_args)?;
        let mut assembled =
            AssembledTransaction::build(self.rpc.clone(), &self.options, options, operation).await?;
        ensure_simulated(&assembled)?;
        send_and_confirm(&mut assembled, options.force).await?;

        let contract_id = derive_contract_id(&self.options.network.network_id(), deployer, salt)?;
        info!(contract_id = %contract_id, "Contract deployed");
        Ok(contract_id)
    }
}

fn ensure_simulated<R: SorobanRpc>(assembled: &AssembledTransaction<R>) -> Result<(), InvokeError> {
    match assembled.outcome() {
        Some(SimulationOutcome::Failed(message)) => Err(InvokeError::SimulationFailed(message.clone())),
        Some(SimulationOutcome::RestoreRequired(_)) => Err(InvokeError::RestoreRequired),
        Some(SimulationOutcome::Ready) | None => Ok(()),
    }
}

async fn send_and_confirm<R: SorobanRpc>(
    assembled: &mut AssembledTransaction<R>,
    force: bool,
) -> Result<(), InvokeError> {
    let response = assembled.sign_and_send(force).await?;
    if response.status == TransactionStatus::Failed {
        return Err(InvokeError::TransactionFailed {
            hash: assembled.hash()?,
            result_xdr: response.result_xdr,
        });
    }
    Ok(())
}

fn parse_wasm_hash(wasm_hash: &str) -> Result<[u8; 32], InvokeError> {
    let bytes = hex::decode(wasm_hash.trim())
        .map_err(|e| SpecError::ConversionFailed(format!("invalid wasm hash `{}`: {}", wasm_hash, e)))?;
    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
        InvokeError::Spec(SpecError::ConversionFailed(format!(
            "wasm hash must be 32 bytes, got {}",
            bytes.len()
        )))
    })
}

/// Load a deployed contract's code: its instance entry names the wasm hash,
/// which keys the code entry
pub async fn fetch_contract_wasm<R: SorobanRpc>(rpc: &R, contract_id: &str) -> Result<Vec<u8>, InvokeError> {
    let contract = strkey::parse_sc_address(contract_id)?;
    let instance_key = LedgerKey::ContractData(LedgerKeyContractData {
        contract,
        key: ScVal::LedgerKeyContractInstance,
        durability: ContractDataDurability::Persistent,
    });

    let response = rpc.get_ledger_entries(&[instance_key]).await?;
    let entry = response
        .entries
        .first()
        .ok_or_else(|| RpcError::RpcError(format!("contract not found: {}", contract_id)))?;

    let wasm_hash: Hash = match entry.data()? {
        LedgerEntryData::ContractData(data) => match data.val {
            ScVal::ContractInstance(instance) => match instance.executable {
                ContractExecutable::Wasm(hash) => hash,
                ContractExecutable::StellarAsset => {
                    return Err(RpcError::InvalidResponse(format!(
                        "{} is a Stellar asset contract and has no wasm",
                        contract_id
                    ))
                    .into())
                }
            },
            other => {
                return Err(RpcError::InvalidResponse(format!(
                    "expected a contract instance, got {}",
                    other.name()
                ))
                .into())
            }
        },
        other => {
            return Err(RpcError::InvalidResponse(format!(
                "expected contract data, got {}",
                other.name()
            ))
            .into())
        }
    };
    debug!(contract_id, wasm_hash = %hex::encode(wasm_hash.0), "Resolved contract code hash");

    let code_key = LedgerKey::ContractCode(LedgerKeyContractCode { hash: wasm_hash });
    let response = rpc.get_ledger_entries(&[code_key]).await?;
    let entry = response
        .entries
        .first()
        .ok_or_else(|| RpcError::RpcError(format!("contract code for {} not found", contract_id)))?;

    match entry.data()? {
        LedgerEntryData::ContractCode(code) => Ok(code.code.to_vec()),
        other => Err(RpcError::InvalidResponse(format!(
            "expected contract code, got {}",
            other.name()
        ))
        .into()),
    }
}
