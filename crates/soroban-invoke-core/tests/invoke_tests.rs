// Integration tests for the invocation lifecycle against an in-memory RPC

use async_trait::async_trait;
use soroban_invoke_core::assembler::{AssembledTransaction, InvocationState, SimulationOutcome};
use soroban_invoke_core::rpc::encode_xdr;
use soroban_invoke_core::transaction::{derive_contract_id, restore_footprint_op};
use soroban_invoke_core::{
    AccountSequence, ClientOptions, ContractClient, GetLedgerEntriesResponse,
    GetTransactionResponse, InvokeError, Keypair, LedgerEntryResult, MethodOptions, PollConfig,
    RestorePreamble, RpcError, SendStatus, SendTransactionResponse, SimulateTransactionResponse,
    SorobanRpc, TransactionStatus,
};
use soroban_invoke_core::rpc::SimulateHostFunctionResult;
use soroban_spec_core::builders::{error_enum_entry, function, result_of, udt};
use soroban_spec_core::testutils::contract_image;
use soroban_spec_core::stellar_xdr::curr::{
    ContractCodeEntry, ContractCodeEntryExt, ContractDataDurability, ContractDataEntry,
    ContractExecutable, ContractId, ExtensionPoint, Hash, InvokeContractArgs, LedgerEntryChanges,
    LedgerEntryData, LedgerFootprint, LedgerKey, LedgerKeyContractCode, LedgerKeyContractData,
    OperationBody, ScAddress, ScContractInstance, ScSpecTypeDef, ScSymbol, ScVal,
    SorobanAddressCredentials, SorobanAuthorizationEntry, SorobanAuthorizedFunction,
    SorobanAuthorizedInvocation, SorobanCredentials, SorobanResources, SorobanTransactionData,
    SorobanTransactionDataExt, SorobanTransactionMeta, SorobanTransactionMetaExt,
    TransactionEnvelope, TransactionMeta, TransactionMetaV3, VecM,
};
use soroban_spec_core::{strkey, NativeValue};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const CONTRACT_HASH: [u8; 32] = [7u8; 32];

#[derive(Default)]
struct MockRpc {
    sequence: i64,
    latest_ledger: u32,
    simulations: Mutex<VecDeque<SimulateTransactionResponse>>,
    send_statuses: Mutex<VecDeque<SendStatus>>,
    tx_statuses: Mutex<VecDeque<GetTransactionResponse>>,
    ledger_entries: Vec<(LedgerKey, LedgerEntryData)>,
    simulated: Mutex<Vec<TransactionEnvelope>>,
    sent: Mutex<Vec<TransactionEnvelope>>,
}

impl MockRpc {
    fn new() -> Self {
        MockRpc {
            sequence: 100,
            latest_ledger: 5000,
            ..Default::default()
        }
    }

    fn simulate(self, response: SimulateTransactionResponse) -> Self {
        self.simulations.lock().unwrap().push_back(response);
        self
    }

    fn send(self, status: SendStatus) -> Self {
        self.send_statuses.lock().unwrap().push_back(status);
        self
    }

    fn finish(self, response: GetTransactionResponse) -> Self {
        self.tx_statuses.lock().unwrap().push_back(response);
        self
    }

    fn sent(&self) -> Vec<TransactionEnvelope> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SorobanRpc for MockRpc {
    async fn get_account(&self, account_id: &str) -> Result<AccountSequence, RpcError> {
        Ok(AccountSequence {
            account_id: account_id.to_string(),
            sequence: self.sequence,
        })
    }

    async fn simulate_transaction(
        &self,
        tx: &TransactionEnvelope,
    ) -> Result<SimulateTransactionResponse, RpcError> {
        self.simulated.lock().unwrap().push(tx.clone());
        self.simulations
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RpcError::RpcError("no simulation queued".to_string()))
    }

    async fn send_transaction(
        &self,
        tx: &TransactionEnvelope,
    ) -> Result<SendTransactionResponse, RpcError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(tx.clone());
        let status = self
            .send_statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SendStatus::Pending);
        Ok(SendTransactionResponse {
            status,
            hash: format!("{:064x}", sent.len()),
            error_result_xdr: None,
            latest_ledger: self.latest_ledger,
        })
    }

    async fn get_transaction(&self, _hash: &str) -> Result<GetTransactionResponse, RpcError> {
        Ok(self
            .tx_statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(GetTransactionResponse::not_found))
    }

    async fn get_ledger_entries(
        &self,
        keys: &[LedgerKey],
    ) -> Result<GetLedgerEntriesResponse, RpcError> {
        let mut entries = Vec::new();
        for (key, data) in &self.ledger_entries {
            if keys.contains(key) {
                entries.push(LedgerEntryResult {
                    key: encode_xdr(key)?,
                    xdr: encode_xdr(data)?,
                    last_modified_ledger_seq: Some(self.latest_ledger),
                    live_until_ledger_seq: None,
                });
            }
        }
        Ok(GetLedgerEntriesResponse {
            entries,
            latest_ledger: self.latest_ledger,
        })
    }

    async fn get_latest_ledger(&self) -> Result<u32, RpcError> {
        Ok(self.latest_ledger)
    }
}

fn contract_address() -> ScAddress {
    ScAddress::Contract(ContractId(Hash(CONTRACT_HASH)))
}

fn invoker() -> Keypair {
    Keypair::from_seed(&[1u8; 32])
}

fn client_options() -> ClientOptions {
    ClientOptions::with_signer(invoker(), strkey::encode_contract(&CONTRACT_HASH)).poll(PollConfig {
        interval: Duration::from_millis(10),
        timeout: Duration::from_millis(300),
    })
}

fn counter_image() -> Vec<u8> {
    let entries = vec![
        function("get_count", vec![], vec![ScSpecTypeDef::U32]).unwrap(),
        function("increment", vec![("amount", ScSpecTypeDef::U32)], vec![ScSpecTypeDef::U32]).unwrap(),
        function(
            "transfer",
            vec![
                ("from", ScSpecTypeDef::Address),
                ("to", ScSpecTypeDef::Address),
                ("amount", ScSpecTypeDef::I128),
            ],
            vec![],
        )
        .unwrap(),
        function("__constructor", vec![("admin", ScSpecTypeDef::Address)], vec![]).unwrap(),
    ];
    contract_image(22, 0, &entries, &[]).unwrap()
}

fn client(rpc: &Arc<MockRpc>) -> ContractClient<MockRpc> {
    ContractClient::from_wasm(client_options(), rpc.clone(), &counter_image()).unwrap()
}

const NO_ARGS: &[(&str, NativeValue)] = &[];

fn transaction_data(writes: bool) -> String {
    let read_write = if writes {
        vec![LedgerKey::ContractData(LedgerKeyContractData {
            contract: contract_address(),
            key: ScVal::Symbol(ScSymbol("COUNTER".try_into().unwrap())),
            durability: ContractDataDurability::Persistent,
        })]
    } else {
        Vec::new()
    };
    encode_xdr(&SorobanTransactionData {
        ext: SorobanTransactionDataExt::V0,
        resources: SorobanResources {
            footprint: LedgerFootprint {
                read_only: VecM::default(),
                read_write: read_write.try_into().unwrap(),
            },
            instructions: 1_000_000,
            disk_read_bytes: 0,
            write_bytes: 0,
        },
        resource_fee: 5_000,
    })
    .unwrap()
}

fn simulation(value: ScVal, writes: bool, auth: Vec<SorobanAuthorizationEntry>) -> SimulateTransactionResponse {
    SimulateTransactionResponse {
        transaction_data: Some(transaction_data(writes)),
        min_resource_fee: Some("5000".to_string()),
        results: vec![SimulateHostFunctionResult {
            auth: auth.iter().map(|a| encode_xdr(a).unwrap()).collect(),
            xdr: encode_xdr(&value).unwrap(),
        }],
        latest_ledger: 5000,
        ..Default::default()
    }
}

fn restore_simulation() -> SimulateTransactionResponse {
    SimulateTransactionResponse {
        restore_preamble: Some(RestorePreamble {
            transaction_data: transaction_data(true),
            min_resource_fee: "2500".to_string(),
        }),
        latest_ledger: 5000,
        ..Default::default()
    }
}

fn success(return_value: Option<ScVal>) -> GetTransactionResponse {
    let result_meta_xdr = return_value.map(|value| {
        encode_xdr(&TransactionMeta::V3(TransactionMetaV3 {
            ext: ExtensionPoint::V0,
            tx_changes_before: LedgerEntryChanges(VecM::default()),
            operations: VecM::default(),
            tx_changes_after: LedgerEntryChanges(VecM::default()),
            soroban_meta: Some(SorobanTransactionMeta {
                ext: SorobanTransactionMetaExt::V0,
                events: VecM::default(),
                return_value: value,
                diagnostic_events: VecM::default(),
            }),
        }))
        .unwrap()
    });
    GetTransactionResponse {
        status: TransactionStatus::Success,
        result_xdr: None,
        result_meta_xdr,
        ledger: Some(5001),
        latest_ledger: 5001,
    }
}

fn auth_entry_for(address: ScAddress) -> SorobanAuthorizationEntry {
    SorobanAuthorizationEntry {
        credentials: SorobanCredentials::Address(SorobanAddressCredentials {
            address,
            nonce: 42,
            signature_expiration_ledger: 0,
            signature: ScVal::Void,
        }),
        root_invocation: SorobanAuthorizedInvocation {
            function: SorobanAuthorizedFunction::ContractFn(InvokeContractArgs {
                contract_address: contract_address(),
                function_name: ScSymbol("transfer".try_into().unwrap()),
                args: VecM::default(),
            }),
            sub_invocations: VecM::default(),
        },
    }
}

#[tokio::test]
async fn test_read_call_returns_simulated_value_without_sending() -> anyhow::Result<()> {
    let rpc = Arc::new(MockRpc::new().simulate(simulation(ScVal::U32(5), false, vec![])));
    let client = client(&rpc);

    let value = client
        .invoke("get_count", NO_ARGS, MethodOptions::default())
        .await?;

    assert_eq!(value, NativeValue::Int(5));
    assert!(rpc.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_write_call_is_signed_sent_and_decoded() {
    let rpc = Arc::new(
        MockRpc::new()
            .simulate(simulation(ScVal::U32(5), true, vec![]))
            .finish(GetTransactionResponse::not_found())
            .finish(success(Some(ScVal::U32(6)))),
    );
    let client = client(&rpc);

    let value = client
        .invoke("increment", &[("amount", NativeValue::from(1u32))], MethodOptions::default())
        .await
        .unwrap();

    assert_eq!(value, NativeValue::Int(6));
    let sent = rpc.sent();
    assert_eq!(sent.len(), 1);
    let TransactionEnvelope::Tx(envelope) = &sent[0] else {
        panic!("expected a v1 envelope");
    };
    assert_eq!(envelope.signatures.len(), 1);
    assert_eq!(envelope.tx.fee, 100 + 5000);
    assert_eq!(envelope.tx.seq_num.0, 101);
}

#[tokio::test]
async fn test_write_with_result_output_decodes_ok_value() -> anyhow::Result<()> {
    let entries = vec![
        error_enum_entry("Error", &[("Overflow", 1)])?,
        function(
            "bump",
            vec![],
            vec![result_of(ScSpecTypeDef::U32, udt("Error")?)],
        )?,
    ];
    let rpc = Arc::new(
        MockRpc::new()
            .simulate(simulation(ScVal::U32(5), true, vec![]))
            .finish(success(Some(ScVal::U32(6)))),
    );
    let client = ContractClient::from_wasm(client_options(), rpc.clone(), &contract_image(22, 0, &entries, &[])?)?;

    let value = client.invoke("bump", NO_ARGS, MethodOptions::default()).await?;

    assert_eq!(value, NativeValue::Int(6));
    assert_eq!(rpc.sent().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_committed_write_with_unexpected_value_is_not_an_error() -> anyhow::Result<()> {
    let rpc = Arc::new(
        MockRpc::new()
            .simulate(simulation(ScVal::U32(5), true, vec![]))
            .finish(success(Some(ScVal::Bool(true)))),
    );
    let client = client(&rpc);

    let value = client
        .invoke("increment", &[("amount", NativeValue::from(1u32))], MethodOptions::default())
        .await?;

    assert_eq!(value, NativeValue::Bool(true));
    assert_eq!(rpc.sent().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_try_again_later_is_resent() {
    let rpc = Arc::new(
        MockRpc::new()
            .simulate(simulation(ScVal::U32(2), true, vec![]))
            .send(SendStatus::TryAgainLater)
            .send(SendStatus::TryAgainLater)
            .send(SendStatus::Pending)
            .finish(success(None)),
    );
    let client = client(&rpc);

    let mut assembled = client
        .build_invoke("increment", &[("amount", NativeValue::from(2u32))], MethodOptions::default())
        .await
        .unwrap();
    assembled.sign_and_send(false).await.unwrap();

    assert_eq!(rpc.sent().len(), 3);
    assert_eq!(assembled.state(), InvocationState::Success);
    assert_eq!(assembled.result().unwrap(), Some(ScVal::U32(2)));
}

#[tokio::test]
async fn test_poll_timeout_is_not_failure() {
    let rpc = Arc::new(MockRpc::new().simulate(simulation(ScVal::U32(1), true, vec![])));
    let client = client(&rpc);

    let mut assembled = client
        .build_invoke("increment", &[("amount", NativeValue::from(1u32))], MethodOptions::default())
        .await
        .unwrap();
    let err = assembled.sign_and_send(false).await.unwrap_err();

    assert!(matches!(err, InvokeError::Timeout { .. }), "got {:?}", err);
    assert_eq!(assembled.state(), InvocationState::Timeout);
}

#[tokio::test]
async fn test_send_error_is_rejected() {
    let rpc = Arc::new(
        MockRpc::new()
            .simulate(simulation(ScVal::U32(1), true, vec![]))
            .send(SendStatus::Error),
    );
    let client = client(&rpc);

    let mut assembled = client
        .build_invoke("increment", &[("amount", NativeValue::from(1u32))], MethodOptions::default())
        .await
        .unwrap();
    let err = assembled.sign_and_send(false).await.unwrap_err();

    assert!(matches!(err, InvokeError::SubmissionRejected { ref status, .. } if status == "ERROR"));
    assert_eq!(assembled.state(), InvocationState::Rejected);
    assert!(assembled.poll_status().await.is_err());
}

#[tokio::test]
async fn test_failed_transaction_is_reported() {
    let rpc = Arc::new(
        MockRpc::new()
            .simulate(simulation(ScVal::U32(1), true, vec![]))
            .finish(GetTransactionResponse {
                status: TransactionStatus::Failed,
                result_xdr: Some("AAAAAAAAAGT/////AAAAAQAAAAAAAAAY/////gAAAAA=".to_string()),
                result_meta_xdr: None,
                ledger: Some(5001),
                latest_ledger: 5001,
            }),
    );
    let client = client(&rpc);

    let err = client
        .invoke("increment", &[("amount", NativeValue::from(1u32))], MethodOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, InvokeError::TransactionFailed { result_xdr: Some(_), .. }));
}

#[tokio::test]
async fn test_simulation_error_is_returned_as_data() {
    let rpc = Arc::new(MockRpc::new().simulate(SimulateTransactionResponse {
        error: Some("HostError: Error(Contract, #3)".to_string()),
        latest_ledger: 5000,
        ..Default::default()
    }));
    let client = client(&rpc);

    let assembled = client
        .build_invoke("get_count", NO_ARGS, MethodOptions::default())
        .await
        .unwrap();
    assert!(matches!(assembled.outcome(), Some(SimulationOutcome::Failed(m)) if m.contains("#3")));

    let rpc = Arc::new(MockRpc::new().simulate(SimulateTransactionResponse {
        error: Some("HostError".to_string()),
        ..Default::default()
    }));
    let err = self::client(&rpc)
        .invoke("get_count", NO_ARGS, MethodOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, InvokeError::SimulationFailed(_)));
}

#[tokio::test]
async fn test_restore_preamble_is_not_actioned_when_disabled() {
    let rpc = Arc::new(MockRpc::new().simulate(restore_simulation()));
    let client = client(&rpc);
    let options = MethodOptions {
        restore: false,
        ..MethodOptions::default()
    };

    let assembled = client
        .build_invoke("increment", &[("amount", NativeValue::from(1u32))], options)
        .await
        .unwrap();

    assert!(matches!(assembled.outcome(), Some(SimulationOutcome::RestoreRequired(_))));
    assert_eq!(assembled.state(), InvocationState::NeedsRestore);
    assert!(rpc.sent().is_empty());

    let rpc = Arc::new(MockRpc::new().simulate(restore_simulation()));
    let err = self::client(&rpc)
        .invoke("increment", &[("amount", NativeValue::from(1u32))], options)
        .await
        .unwrap_err();
    assert!(matches!(err, InvokeError::RestoreRequired));
}

#[tokio::test]
async fn test_restore_then_resimulate() {
    let rpc = Arc::new(
        MockRpc::new()
            .simulate(restore_simulation())
            .simulate(simulation(ScVal::U32(9), true, vec![]))
            .finish(success(None)),
    );
    let client = client(&rpc);

    let assembled = client
        .build_invoke("increment", &[("amount", NativeValue::from(1u32))], MethodOptions::default())
        .await
        .unwrap();

    assert_eq!(assembled.outcome(), Some(&SimulationOutcome::Ready));
    assert_eq!(assembled.state(), InvocationState::Simulated);

    let sent = rpc.sent();
    assert_eq!(sent.len(), 1);
    let TransactionEnvelope::Tx(restore) = &sent[0] else {
        panic!("expected a v1 envelope");
    };
    assert!(matches!(
        restore.tx.operations[0].body,
        OperationBody::RestoreFootprint(_)
    ));
    assert_eq!(restore.tx.fee, 100 + 2500);
    assert_eq!(rpc.simulated.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_restore_without_signer_is_not_signable() {
    let rpc = Arc::new(MockRpc::new().simulate(restore_simulation()));
    let mut options = client_options();
    options.signer = None;
    let client = ContractClient::from_wasm(options, rpc.clone(), &counter_image()).unwrap();

    let err = client
        .build_invoke("increment", &[("amount", NativeValue::from(1u32))], MethodOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, InvokeError::NotSignable(_)));
    assert!(rpc.sent().is_empty());
}

#[tokio::test]
async fn test_restore_transaction_needs_no_other_signers() {
    let rpc = Arc::new(MockRpc::new());
    let options = MethodOptions {
        simulate: false,
        ..MethodOptions::default()
    };

    let assembled = AssembledTransaction::build(rpc.clone(), &client_options(), options, restore_footprint_op())
        .await
        .unwrap();

    assert_eq!(assembled.state(), InvocationState::Built);
    assert!(assembled.needs_non_invoker_signing_by(true).is_empty());
    assert!(!assembled.is_read_call());
}

#[tokio::test]
async fn test_multi_party_authorization() {
    let alice = Keypair::from_seed(&[2u8; 32]);
    let auth = vec![
        auth_entry_for(alice.sc_address()),
        auth_entry_for(alice.sc_address()),
        auth_entry_for(invoker().sc_address()),
    ];
    let rpc = Arc::new(MockRpc::new().simulate(simulation(ScVal::Void, true, auth)));
    let client = client(&rpc);
    let args = [
        ("from", NativeValue::from(alice.account_id())),
        ("to", NativeValue::from(invoker().account_id())),
        ("amount", NativeValue::from(10i128)),
    ];

    let mut assembled = client
        .build_invoke("transfer", &args, MethodOptions::default())
        .await
        .unwrap();

    assert_eq!(assembled.needs_non_invoker_signing_by(false), vec![alice.account_id()]);
    assert!(!assembled.is_read_call());
    assert!(matches!(assembled.sign(false), Err(InvokeError::NotSignable(_))));

    let stranger = Keypair::from_seed(&[3u8; 32]);
    assert!(matches!(
        assembled.sign_auth_entries(&stranger, Some(6000)).await,
        Err(InvokeError::NotSignable(_))
    ));

    let signed = assembled.sign_auth_entries(&alice, None).await.unwrap();
    assert_eq!(signed, 2);
    assert!(assembled.needs_non_invoker_signing_by(false).is_empty());
    assert_eq!(assembled.needs_non_invoker_signing_by(true), vec![alice.account_id()]);

    assembled.sign(false).unwrap();
    assert_eq!(assembled.state(), InvocationState::Signed);
    assert_eq!(assembled.signatures().len(), 1);
}

#[tokio::test]
async fn test_read_call_is_not_signed_unless_forced() {
    let rpc = Arc::new(MockRpc::new().simulate(simulation(ScVal::U32(5), false, vec![])));
    let client = client(&rpc);

    let mut assembled = client
        .build_invoke("get_count", NO_ARGS, MethodOptions::default())
        .await
        .unwrap();
    assert!(assembled.is_read_call());
    assert!(matches!(assembled.sign(false), Err(InvokeError::NotSignable(_))));
    assembled.sign(true).unwrap();
    assert_eq!(assembled.state(), InvocationState::Signed);
}

#[tokio::test]
async fn test_for_contract_loads_interface_from_ledger() {
    let image = counter_image();
    let wasm_hash = Hash([9u8; 32]);
    let mut rpc = MockRpc::new();
    rpc.ledger_entries = vec![
        (
            LedgerKey::ContractData(LedgerKeyContractData {
                contract: contract_address(),
                key: ScVal::LedgerKeyContractInstance,
                durability: ContractDataDurability::Persistent,
            }),
            LedgerEntryData::ContractData(ContractDataEntry {
                ext: ExtensionPoint::V0,
                contract: contract_address(),
                key: ScVal::LedgerKeyContractInstance,
                durability: ContractDataDurability::Persistent,
                val: ScVal::ContractInstance(ScContractInstance {
                    executable: ContractExecutable::Wasm(wasm_hash.clone()),
                    storage: None,
                }),
            }),
        ),
        (
            LedgerKey::ContractCode(LedgerKeyContractCode {
                hash: wasm_hash.clone(),
            }),
            LedgerEntryData::ContractCode(ContractCodeEntry {
                ext: ContractCodeEntryExt::V0,
                hash: wasm_hash,
                code: image.clone().try_into().unwrap(),
            }),
        ),
    ];

    let client = ContractClient::for_contract_with(client_options(), Arc::new(rpc))
        .await
        .unwrap();
    assert!(client.spec().has_function("increment"));
    assert!(client.spec().has_function("transfer"));

    let missing = ContractClient::for_contract_with(client_options(), Arc::new(MockRpc::new())).await;
    assert!(matches!(missing, Err(InvokeError::Transport(RpcError::RpcError(_)))));
}

#[tokio::test]
async fn test_install_and_deploy() {
    let rpc = Arc::new(
        MockRpc::new()
            .simulate(simulation(ScVal::Void, true, vec![]))
            .finish(success(None))
            .simulate(simulation(ScVal::Void, true, vec![]))
            .finish(success(None)),
    );
    let client = client(&rpc);
    let image = counter_image();

    let wasm_hash = client.install(&image, MethodOptions::default()).await.unwrap();
    assert_eq!(wasm_hash.len(), 64);

    let salt = [4u8; 32];
    let contract_id = client
        .deploy(
            &wasm_hash,
            &[("admin", NativeValue::from(invoker().account_id()))],
            Some(salt),
            MethodOptions::default(),
        )
        .await
        .unwrap();

    let expected = derive_contract_id(
        &client.options().network.network_id(),
        invoker().sc_address(),
        salt,
    )
    .unwrap();
    assert_eq!(contract_id, expected);
    assert_eq!(rpc.sent().len(), 2);

    let err = client
        .deploy(&wasm_hash, NO_ARGS, Some(salt), MethodOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, InvokeError::Spec(_)));
}
