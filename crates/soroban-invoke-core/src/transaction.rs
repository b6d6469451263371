//! Transaction construction and signing.
//!
//! Envelopes are v1 transactions with a single operation. Signature payloads
//! are bound to the network by its id (SHA-256 of the passphrase).

use crate::error::InvokeError;
use crate::keypair::Keypair;
use base64::Engine;
use sha2::{Digest, Sha256};
use soroban_spec_core::strkey;
use std::time::{SystemTime, UNIX_EPOCH};
use stellar_xdr::curr::{
    ContractExecutable, ContractIdPreimage, ContractIdPreimageFromAddress, CreateContractArgsV2,
    DecoratedSignature, ExtensionPoint, Hash, HashIdPreimage, HashIdPreimageContractId,
    HashIdPreimageSorobanAuthorization, HostFunction, InvokeContractArgs, InvokeHostFunctionOp,
    Limits, Memo, MuxedAccount, Operation, OperationBody, Preconditions, ReadXdr,
    RestoreFootprintOp, ScAddress, ScBytes, ScMap, ScMapEntry, ScSymbol, ScVal, ScVec,
    SequenceNumber, Signature, SignatureHint, SorobanAuthorizationEntry, SorobanCredentials,
    TimeBounds, TimePoint, Transaction, TransactionEnvelope, TransactionExt,
    TransactionSignaturePayload, TransactionSignaturePayloadTaggedTransaction,
    TransactionV1Envelope, Uint256, VecM, WriteXdr,
};

pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(bytes));
    out
}

/// Unsigned transaction for `source` at the next sequence number. A zero
/// timeout leaves the upper time bound open.
pub fn build_transaction(
    source: &[u8; 32],
    current_sequence: i64,
    fee: u32,
    timeout_secs: u64,
    operation: Operation,
) -> Result<Transaction, InvokeError> {
    let max_time = if timeout_secs == 0 {
        0
    } else {
        unix_now().saturating_add(timeout_secs)
    };

    Ok(Transaction {
        source_account: MuxedAccount::Ed25519(Uint256(*source)),
        fee,
        seq_num: SequenceNumber(current_sequence.saturating_add(1)),
        cond: Preconditions::Time(TimeBounds {
            min_time: TimePoint(0),
            max_time: TimePoint(max_time),
        }),
        memo: Memo::None,
        operations: vec![operation].try_into()?,
        ext: TransactionExt::V0,
    })
}

pub fn envelope(tx: &Transaction, signatures: &[DecoratedSignature]) -> Result<TransactionEnvelope, InvokeError> {
    Ok(TransactionEnvelope::Tx(TransactionV1Envelope {
        tx: tx.clone(),
        signatures: signatures.to_vec().try_into()?,
    }))
}

pub fn envelope_to_base64(envelope: &TransactionEnvelope) -> Result<String, InvokeError> {
    let engine = base64::engine::general_purpose::STANDARD;
    Ok(engine.encode(envelope.to_xdr(Limits::none())?))
}

pub fn envelope_from_base64(xdr: &str) -> Result<TransactionEnvelope, InvokeError> {
    let engine = base64::engine::general_purpose::STANDARD;
    let bytes = engine
        .decode(xdr)
        .map_err(|e| InvokeError::Xdr(format!("invalid base64 envelope: {}", e)))?;
    Ok(TransactionEnvelope::from_xdr(bytes, Limits::none())?)
}

/// Hash signed by every signer of `tx` on the given network
pub fn transaction_hash(tx: &Transaction, network_id: &[u8; 32]) -> Result<[u8; 32], InvokeError> {
    let payload = TransactionSignaturePayload {
        network_id: Hash(*network_id),
        tagged_transaction: TransactionSignaturePayloadTaggedTransaction::Tx(tx.clone()),
    };
    Ok(sha256(&payload.to_xdr(Limits::none())?))
}

pub fn sign_transaction(
    tx: &Transaction,
    keypair: &Keypair,
    network_id: &[u8; 32],
) -> Result<DecoratedSignature, InvokeError> {
    let hash = transaction_hash(tx, network_id)?;
    Ok(DecoratedSignature {
        hint: SignatureHint(keypair.signature_hint()),
        signature: Signature(keypair.sign(&hash).to_vec().try_into()?),
    })
}

pub fn invoke_contract_op(
    contract: ScAddress,
    function: &str,
    args: Vec<ScVal>,
) -> Result<Operation, InvokeError> {
    let function_name = ScSymbol(function.try_into().map_err(|_| {
        InvokeError::Xdr(format!("invalid function name `{}`", function))
    })?);
    Ok(host_function_op(HostFunction::InvokeContract(InvokeContractArgs {
        contract_address: contract,
        function_name,
        args: args.try_into()?,
    })))
}

pub fn upload_wasm_op(wasm: &[u8]) -> Result<Operation, InvokeError> {
    Ok(host_function_op(HostFunction::UploadContractWasm(
        wasm.to_vec().try_into()?,
    )))
}

pub fn create_contract_op(
    deployer: ScAddress,
    wasm_hash: [u8; 32],
    salt: [u8; 32],
    constructor_args: Vec<ScVal>,
) -> Result<Operation, InvokeError> {
    Ok(host_function_op(HostFunction::CreateContractV2(
        CreateContractArgsV2 {
            contract_id_preimage: contract_id_preimage(deployer, salt),
            executable: ContractExecutable::Wasm(Hash(wasm_hash)),
            constructor_args: constructor_args.try_into()?,
        },
    )))
}

pub fn restore_footprint_op() -> Operation {
    Operation {
        source_account: None,
        body: OperationBody::RestoreFootprint(RestoreFootprintOp {
            ext: ExtensionPoint::V0,
        }),
    }
}

fn host_function_op(host_function: HostFunction) -> Operation {
    Operation {
        source_account: None,
        body: OperationBody::InvokeHostFunction(InvokeHostFunctionOp {
            host_function,
            auth: VecM::default(),
        }),
    }
}

fn contract_id_preimage(deployer: ScAddress, salt: [u8; 32]) -> ContractIdPreimage {
    ContractIdPreimage::Address(ContractIdPreimageFromAddress {
        address: deployer,
        salt: Uint256(salt),
    })
}

/// Id a contract created by `deployer` with `salt` will have (C...)
pub fn derive_contract_id(
    network_id: &[u8; 32],
    deployer: ScAddress,
    salt: [u8; 32],
) -> Result<String, InvokeError> {
    let preimage = HashIdPreimage::ContractId(HashIdPreimageContractId {
        network_id: Hash(*network_id),
        contract_id_preimage: contract_id_preimage(deployer, salt),
    });
    let id = sha256(&preimage.to_xdr(Limits::none())?);
    Ok(strkey::encode_contract(&id))
}

/// Sign one authorization entry with `keypair`, valid through ledger
/// `valid_until_ledger`. Entries authorized by the transaction source
/// carry no signature and are rejected.
pub fn sign_authorization_entry(
    entry: &SorobanAuthorizationEntry,
    keypair: &Keypair,
    valid_until_ledger: u32,
    network_id: &[u8; 32],
) -> Result<SorobanAuthorizationEntry, InvokeError> {
    let SorobanCredentials::Address(credentials) = &entry.credentials else {
        return Err(InvokeError::NotSignable(
            "entry is authorized by the transaction source account".to_string(),
        ));
    };

    let preimage = HashIdPreimage::SorobanAuthorization(HashIdPreimageSorobanAuthorization {
        network_id: Hash(*network_id),
        nonce: credentials.nonce,
        signature_expiration_ledger: valid_until_ledger,
        invocation: entry.root_invocation.clone(),
    });
    let payload = sha256(&preimage.to_xdr(Limits::none())?);
    let signature = keypair.sign(&payload);

    let signature_map = ScMap(
        vec![
            ScMapEntry {
                key: ScVal::Symbol(ScSymbol("public_key".try_into()?)),
                val: ScVal::Bytes(ScBytes(keypair.public_key().to_vec().try_into()?)),
            },
            ScMapEntry {
                key: ScVal::Symbol(ScSymbol("signature".try_into()?)),
                val: ScVal::Bytes(ScBytes(signature.to_vec().try_into()?)),
            },
        ]
        .try_into()?,
    );

    let mut credentials = credentials.clone();
    credentials.signature_expiration_ledger = valid_until_ledger;
    credentials.signature = ScVal::Vec(Some(ScVec(
        vec![ScVal::Map(Some(signature_map))].try_into()?,
    )));

    Ok(SorobanAuthorizationEntry {
        credentials: SorobanCredentials::Address(credentials),
        root_invocation: entry.root_invocation.clone(),
    })
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
