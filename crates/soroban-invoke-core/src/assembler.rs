//! Transaction lifecycle for a single contract call.
//!
//! An [`AssembledTransaction`] moves through an explicit [`InvocationState`]
//! machine: it is built against the invoker's current sequence, simulated
//! (restoring archived state when asked), signed, submitted and polled until
//! the network reports a final status or the polling window closes.

use crate::config::{ClientOptions, MethodOptions, NetworkConfig, PollConfig};
use crate::error::InvokeError;
use crate::keypair::Keypair;
use crate::rpc::{
    GetTransactionResponse, RestorePreamble, SendStatus, SendTransactionResponse,
    SimulateTransactionResponse, SorobanRpc, TransactionStatus,
};
use crate::transaction::{
    build_transaction, envelope, invoke_contract_op, restore_footprint_op,
    sign_authorization_entry, sign_transaction, transaction_hash,
};
use soroban_spec_core::strkey;
use soroban_spec_core::{ContractSpec, NativeValue};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stellar_xdr::curr::{
    DecoratedSignature, InvokeHostFunctionOp, Operation, OperationBody, ScVal,
    SorobanCredentials, Transaction, TransactionEnvelope, TransactionExt,
};
use tracing::{debug, error, info, warn};

/// Ledgers an authorization signature stays valid when no expiry is given
pub const DEFAULT_AUTH_VALIDITY_LEDGERS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvocationState {
    Built,
    Simulated,
    NeedsRestore,
    Restored,
    Signed,
    Submitted,
    Pending,
    Success,
    Failed,
    Rejected,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Simulate,
    RequireRestore,
    Restore,
    Sign,
    Submit,
    Poll,
    Succeed,
    Fail,
    Reject,
    TimeOut,
}

impl InvocationState {
    pub fn advance(self, transition: Transition) -> Result<InvocationState, InvokeError> {
        use InvocationState::*;

        let next = match (self, transition) {
            (Built | Simulated | Restored, Transition::Simulate) => Simulated,
            (Built | Simulated | Restored, Transition::RequireRestore) => NeedsRestore,
            (NeedsRestore, Transition::Restore) => Restored,
            (Built | Simulated, Transition::Sign) => Signed,
            (Signed | Submitted, Transition::Submit) => Submitted,
            (Submitted | Pending, Transition::Poll) => Pending,
            (Submitted | Pending, Transition::Succeed) => Success,
            (Submitted | Pending, Transition::Fail) => Failed,
            (Submitted | Pending, Transition::TimeOut) => Timeout,
            (Submitted, Transition::Reject) => Rejected,
            (state, transition) => {
                return Err(InvokeError::InvalidState {
                    state: state.to_string(),
                    action: transition.to_string(),
                })
            }
        };
        Ok(next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InvocationState::Success
                | InvocationState::Failed
                | InvocationState::Rejected
                | InvocationState::Timeout
        )
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InvocationState::Built => "built",
            InvocationState::Simulated => "simulated",
            InvocationState::NeedsRestore => "needs-restore",
            InvocationState::Restored => "restored",
            InvocationState::Signed => "signed",
            InvocationState::Submitted => "submitted",
            InvocationState::Pending => "pending",
            InvocationState::Success => "success",
            InvocationState::Failed => "failed",
            InvocationState::Rejected => "rejected",
            InvocationState::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transition::Simulate => "simulate",
            Transition::RequireRestore => "require restore",
            Transition::Restore => "restore",
            Transition::Sign => "sign",
            Transition::Submit => "submit",
            Transition::Poll => "poll",
            Transition::Succeed => "succeed",
            Transition::Fail => "fail",
            Transition::Reject => "reject",
            Transition::TimeOut => "time out",
        };
        f.write_str(name)
    }
}

/// What the last simulation reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationOutcome {
    Ready,
    Failed(String),
    RestoreRequired(RestorePreamble),
}

pub struct AssembledTransaction<R: SorobanRpc> {
    rpc: Arc<R>,
    network: NetworkConfig,
    poll: PollConfig,
    source_account: String,
    source_key: [u8; 32],
    signer: Option<Keypair>,
    options: MethodOptions,
    operation: Operation,
    tx: Transaction,
    signatures: Vec<DecoratedSignature>,
    state: InvocationState,
    simulation: Option<SimulateTransactionResponse>,
    outcome: Option<SimulationOutcome>,
    simulated_value: Option<ScVal>,
    send_response: Option<SendTransactionResponse>,
    tx_response: Option<GetTransactionResponse>,
    submitted_at: Option<Instant>,
}

impl<R: SorobanRpc> AssembledTransaction<R> {
    /// Wrap `operation` in a transaction from the invoker's next sequence
    /// number, simulating it unless `options.simulate` is off
    pub async fn build(
        rpc: Arc<R>,
        client: &ClientOptions,
        options: MethodOptions,
        operation: Operation,
    ) -> Result<Self, InvokeError> {
        let source_key = strkey::decode_account_id(&client.source_account)?;
        let account = rpc.get_account(&client.source_account).await?;
        let tx = build_transaction(
            &source_key,
            account.sequence,
            options.fee,
            options.timeout_secs,
            operation.clone(),
        )?;
        debug!(
            source = %client.source_account,
            sequence = account.sequence + 1,
            "Built transaction"
        );

        let mut assembled = AssembledTransaction {
            rpc,
            network: client.network.clone(),
            poll: client.poll,
            source_account: client.source_account.clone(),
            source_key,
            signer: client.signer.clone(),
            options,
            operation,
            tx,
            signatures: Vec::new(),
            state: InvocationState::Built,
            simulation: None,
            outcome: None,
            simulated_value: None,
            send_response: None,
            tx_response: None,
            submitted_at: None,
        };

        if options.simulate {
            assembled.simulate(options.restore).await?;
        }
        Ok(assembled)
    }

    /// Call `method` on the client's contract with spec-encoded arguments
    pub async fn build_invocation<K: AsRef<str>>(
        rpc: Arc<R>,
        client: &ClientOptions,
        options: MethodOptions,
        spec: &ContractSpec,
        method: &str,
        args: &[(K, NativeValue)],
    ) -> Result<Self, InvokeError> {
        let contract = strkey::parse_sc_address(&client.contract_id)?;
        let args = spec.func_args_to_xdr(method, args)?;
        let operation = invoke_contract_op(contract, method, args)?;
        Self::build(rpc, client, options, operation).await
    }

    /// Simulate the transaction and fold the result into it. Errors reported
    /// by the simulation come back as [`SimulationOutcome::Failed`]. With
    /// `restore` set, archived state is restored once and the call simulated
    /// again.
    pub async fn simulate(&mut self, restore: bool) -> Result<SimulationOutcome, InvokeError> {
        self.state.advance(Transition::Simulate)?;
        let mut restored = false;

        loop {
            let response = self
                .rpc
                .simulate_transaction(&envelope(&self.tx, &[])?)
                .await?;

            if let Some(message) = response.error.clone() {
                debug!(error = %message, "Simulation reported an error");
                return self.record(response, Transition::Simulate, SimulationOutcome::Failed(message));
            }

            if let Some(preamble) = response.restore_preamble.clone() {
                self.state = self.state.advance(Transition::RequireRestore)?;
                self.simulation = Some(response);
                if restore && !restored {
                    self.restore_footprint(&preamble).await?;
                    restored = true;
                    continue;
                }
                warn!(source = %self.source_account, "Archived ledger entries need restoring");
                let outcome = SimulationOutcome::RestoreRequired(preamble);
                self.outcome = Some(outcome.clone());
                return Ok(outcome);
            }

            self.apply_simulation(&response)?;
            return self.record(response, Transition::Simulate, SimulationOutcome::Ready);
        }
    }

    fn record(
        &mut self,
        response: SimulateTransactionResponse,
        transition: Transition,
        outcome: SimulationOutcome,
    ) -> Result<SimulationOutcome, InvokeError> {
        self.state = self.state.advance(transition)?;
        self.simulation = Some(response);
        self.outcome = Some(outcome.clone());
        Ok(outcome)
    }

    fn apply_simulation(&mut self, response: &SimulateTransactionResponse) -> Result<(), InvokeError> {
        self.tx.fee = total_fee(self.options.fee, response.min_resource_fee()?)?;
        if let Some(data) = response.transaction_data()? {
            self.tx.ext = TransactionExt::V1(data);
        }

        let auth = response.auth()?;
        let mut operations = self.tx.operations.to_vec();
        if let Some(Operation {
            body: OperationBody::InvokeHostFunction(op),
            ..
        }) = operations.first_mut()
        {
            if op.auth.is_empty() {
                op.auth = auth.try_into()?;
            }
        }
        self.tx.operations = operations.try_into()?;

        self.simulated_value = response.return_value()?;
        Ok(())
    }

    /// Submit a footprint restoration for `preamble`, then rebuild the
    /// invocation at the refreshed sequence number
    pub async fn restore_footprint(
        &mut self,
        preamble: &RestorePreamble,
    ) -> Result<GetTransactionResponse, InvokeError> {
        self.state.advance(Transition::Restore)?;
        let signer = self.signer.clone().ok_or_else(|| {
            InvokeError::NotSignable("restoring archived state needs the invoker's secret key".to_string())
        })?;
        warn!(source = %self.source_account, "Restoring archived ledger entries");

        let account = self.rpc.get_account(&self.source_account).await?;
        let mut restore_tx = build_transaction(
            &self.source_key,
            account.sequence,
            total_fee(self.options.fee, preamble.min_resource_fee()?)?,
            self.options.timeout_secs,
            restore_footprint_op(),
        )?;
        restore_tx.ext = TransactionExt::V1(preamble.transaction_data()?);

        let signature = sign_transaction(&restore_tx, &signer, &self.network.network_id())?;
        let restore_envelope = envelope(&restore_tx, &[signature])?;

        let started = Instant::now();
        let window = self.poll_window();
        let sent = send_until_accepted(
            self.rpc.as_ref(),
            &restore_envelope,
            self.poll.interval,
            started + window,
        )
        .await?;
        if sent.status != SendStatus::Pending {
            return Err(InvokeError::RestoreFailed(format!(
                "restore transaction {} was not accepted: {}",
                sent.hash, sent.status
            )));
        }

        let response =
            poll_until_final(self.rpc.as_ref(), &sent.hash, self.poll.interval, started, window)
                .await?;
        if response.status != TransactionStatus::Success {
            error!(hash = %sent.hash, status = %response.status, "Restore transaction failed");
            return Err(InvokeError::RestoreFailed(format!(
                "restore transaction {} finished with status {}",
                sent.hash, response.status
            )));
        }

        let account = self.rpc.get_account(&self.source_account).await?;
        self.tx = build_transaction(
            &self.source_key,
            account.sequence,
            self.options.fee,
            self.options.timeout_secs,
            self.operation.clone(),
        )?;
        self.signatures.clear();
        self.simulated_value = None;
        self.state = self.state.advance(Transition::Restore)?;
        info!(hash = %sent.hash, "Archived state restored");
        Ok(response)
    }

    fn invoke_op(&self) -> Option<&InvokeHostFunctionOp> {
        match self.tx.operations.first().map(|op| &op.body) {
            Some(OperationBody::InvokeHostFunction(op)) => Some(op),
            _ => None,
        }
    }

    /// Addresses other than the invoker that must sign authorization
    /// entries, in entry order
    pub fn needs_non_invoker_signing_by(&self, include_already_signed: bool) -> Vec<String> {
        let Some(op) = self.invoke_op() else {
            return Vec::new();
        };

        let mut signers: Vec<String> = Vec::new();
        for entry in op.auth.iter() {
            let SorobanCredentials::Address(credentials) = &entry.credentials else {
                continue;
            };
            if !include_already_signed && credentials.signature != ScVal::Void {
                continue;
            }
            let address = strkey::format_sc_address(&credentials.address);
            if address != self.source_account && !signers.contains(&address) {
                signers.push(address);
            }
        }
        signers
    }

    /// A successfully simulated call that needs no authorization and writes
    /// nothing
    pub fn is_read_call(&self) -> bool {
        if self.outcome != Some(SimulationOutcome::Ready) {
            return false;
        }
        let auth_count = self.invoke_op().map(|op| op.auth.len()).unwrap_or_default();
        let writes = match &self.tx.ext {
            TransactionExt::V1(data) => data.resources.footprint.read_write.len(),
            TransactionExt::V0 => 0,
        };
        auth_count == 0 && writes == 0
    }

    /// Sign the envelope with the invoker's key
    pub fn sign(&mut self, force: bool) -> Result<(), InvokeError> {
        self.state.advance(Transition::Sign)?;
        let signer = self.signer.as_ref().ok_or_else(|| {
            InvokeError::NotSignable("no secret key for the invoking account".to_string())
        })?;
        if signer.account_id() != self.source_account {
            return Err(InvokeError::NotSignable(format!(
                "signer {} is not the source account {}",
                signer.account_id(),
                self.source_account
            )));
        }
        if let Some(SimulationOutcome::Failed(message)) = &self.outcome {
            return Err(InvokeError::SimulationFailed(message.clone()));
        }

        if !force {
            if self.is_read_call() {
                return Err(InvokeError::NotSignable(
                    "read call needs no signature; force signing to submit it anyway".to_string(),
                ));
            }
            let pending = self.needs_non_invoker_signing_by(false);
            if !pending.is_empty() {
                return Err(InvokeError::NotSignable(format!(
                    "authorization entries still need signatures from: {}",
                    pending.join(", ")
                )));
            }
        }

        let signature = sign_transaction(&self.tx, signer, &self.network.network_id())?;
        self.signatures.push(signature);
        self.state = self.state.advance(Transition::Sign)?;
        debug!(source = %self.source_account, "Transaction signed");
        Ok(())
    }

    /// Sign every authorization entry belonging to `keypair`. Without an
    /// explicit expiry the signatures last [`DEFAULT_AUTH_VALIDITY_LEDGERS`]
    /// past the latest ledger. Returns how many entries were signed.
    pub async fn sign_auth_entries(
        &mut self,
        keypair: &Keypair,
        valid_until_ledger: Option<u32>,
    ) -> Result<usize, InvokeError> {
        self.state.advance(Transition::Sign)?;
        let valid_until = match valid_until_ledger {
            Some(ledger) => ledger,
            None => self
                .rpc
                .get_latest_ledger()
                .await?
                .saturating_add(DEFAULT_AUTH_VALIDITY_LEDGERS),
        };
        let address = keypair.account_id();
        let network_id = self.network.network_id();

        let mut operations = self.tx.operations.to_vec();
        let Some(Operation {
            body: OperationBody::InvokeHostFunction(op),
            ..
        }) = operations.first_mut()
        else {
            return Err(InvokeError::NotSignable(
                "operation carries no authorization entries".to_string(),
            ));
        };

        let mut entries = op.auth.to_vec();
        let mut signed = 0;
        for entry in entries.iter_mut() {
            let owned = match &entry.credentials {
                SorobanCredentials::Address(c) => strkey::format_sc_address(&c.address) == address,
                SorobanCredentials::SourceAccount => false,
            };
            if owned {
                *entry = sign_authorization_entry(entry, keypair, valid_until, &network_id)?;
                signed += 1;
            }
        }
        if signed == 0 {
            return Err(InvokeError::NotSignable(format!(
                "no authorization entry needs a signature from {}",
                address
            )));
        }

        op.auth = entries.try_into()?;
        self.tx.operations = operations.try_into()?;
        debug!(signer = %address, entries = signed, valid_until, "Authorization entries signed");
        Ok(signed)
    }

    /// Send the signed envelope. Statuses other than PENDING are returned as
    /// data; TRY_AGAIN_LATER is re-sent until the polling window closes.
    pub async fn submit(&mut self) -> Result<SendTransactionResponse, InvokeError> {
        self.state.advance(Transition::Submit)?;
        let envelope = self.to_envelope()?;
        let started = Instant::now();
        let window = self.poll_window();

        let response =
            send_until_accepted(self.rpc.as_ref(), &envelope, self.poll.interval, started + window)
                .await?;
        self.submitted_at = Some(started);
        self.state = self.state.advance(Transition::Submit)?;
        self.send_response = Some(response.clone());

        match response.status {
            SendStatus::Pending => {
                info!(hash = %response.hash, "Transaction submitted");
            }
            SendStatus::Duplicate | SendStatus::Error => {
                warn!(hash = %response.hash, status = %response.status, "Transaction rejected");
                self.state = self.state.advance(Transition::Reject)?;
            }
            SendStatus::TryAgainLater => {
                self.state = self.state.advance(Transition::TimeOut)?;
                return Err(InvokeError::Timeout {
                    hash: response.hash,
                    waited_secs: started.elapsed().as_secs(),
                });
            }
        }
        Ok(response)
    }

    /// Poll until the transaction reaches a ledger or the window measured
    /// from submission closes
    pub async fn poll_status(&mut self) -> Result<GetTransactionResponse, InvokeError> {
        self.state.advance(Transition::Poll)?;
        let hash = match &self.send_response {
            Some(sent) => sent.hash.clone(),
            None => {
                return Err(InvokeError::InvalidState {
                    state: self.state.to_string(),
                    action: Transition::Poll.to_string(),
                })
            }
        };
        let started = self.submitted_at.unwrap_or_else(Instant::now);
        self.state = self.state.advance(Transition::Poll)?;

        match poll_until_final(self.rpc.as_ref(), &hash, self.poll.interval, started, self.poll_window()).await {
            Ok(response) => {
                let transition = if response.status == TransactionStatus::Success {
                    info!(hash = %hash, ledger = ?response.ledger, "Transaction succeeded");
                    Transition::Succeed
                } else {
                    error!(hash = %hash, result_xdr = ?response.result_xdr, "Transaction failed");
                    Transition::Fail
                };
                self.state = self.state.advance(transition)?;
                self.tx_response = Some(response.clone());
                Ok(response)
            }
            Err(err @ InvokeError::Timeout { .. }) => {
                warn!(hash = %hash, "Gave up waiting for transaction");
                self.state = self.state.advance(Transition::TimeOut)?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Sign (unless already signed), submit and wait for the final status
    pub async fn sign_and_send(&mut self, force: bool) -> Result<GetTransactionResponse, InvokeError> {
        if self.state != InvocationState::Signed {
            self.sign(force)?;
        }
        let sent = self.submit().await?;
        if sent.status != SendStatus::Pending {
            return Err(InvokeError::SubmissionRejected {
                status: sent.status.to_string(),
                hash: sent.hash,
            });
        }
        self.poll_status().await
    }

    /// Return value of the call: from the result meta once the transaction
    /// succeeded, otherwise the simulated value
    pub fn result(&self) -> Result<Option<ScVal>, InvokeError> {
        if let Some(response) = &self.tx_response {
            match response.status {
                TransactionStatus::Failed => {
                    return Err(InvokeError::TransactionFailed {
                        hash: self.hash()?,
                        result_xdr: response.result_xdr.clone(),
                    })
                }
                TransactionStatus::Success => {
                    if let Some(value) = response.return_value()? {
                        return Ok(Some(value));
                    }
                }
                TransactionStatus::NotFound => {}
            }
        }
        Ok(self.simulated_value.clone())
    }

    /// Hex hash of the transaction on its network
    pub fn hash(&self) -> Result<String, InvokeError> {
        Ok(hex::encode(transaction_hash(&self.tx, &self.network.network_id())?))
    }

    pub fn to_envelope(&self) -> Result<TransactionEnvelope, InvokeError> {
        envelope(&self.tx, &self.signatures)
    }

    fn poll_window(&self) -> Duration {
        match self.options.timeout_secs {
            0 => self.poll.timeout,
            secs => Duration::from_secs(secs).min(self.poll.timeout),
        }
    }

    pub fn state(&self) -> InvocationState {
        self.state
    }

    pub fn outcome(&self) -> Option<&SimulationOutcome> {
        self.outcome.as_ref()
    }

    pub fn simulation(&self) -> Option<&SimulateTransactionResponse> {
        self.simulation.as_ref()
    }

    pub fn simulated_value(&self) -> Option<&ScVal> {
        self.simulated_value.as_ref()
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    pub fn signatures(&self) -> &[DecoratedSignature] {
        &self.signatures
    }

    pub fn options(&self) -> &MethodOptions {
        &self.options
    }

    pub fn send_response(&self) -> Option<&SendTransactionResponse> {
        self.send_response.as_ref()
    }

    pub fn tx_response(&self) -> Option<&GetTransactionResponse> {
        self.tx_response.as_ref()
    }
}

impl<R: SorobanRpc> fmt::Debug for AssembledTransaction<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssembledTransaction")
            .field("source_account", &self.source_account)
            .field("state", &self.state)
            .field("outcome", &self.outcome)
            .field("signatures", &self.signatures.len())
            .finish_non_exhaustive()
    }
}

fn total_fee(inclusion_fee: u32, resource_fee: i64) -> Result<u32, InvokeError> {
    let total = i64::from(inclusion_fee).saturating_add(resource_fee);
    u32::try_from(total).map_err(|_| {
        InvokeError::SimulationFailed(format!("total fee {} does not fit a transaction", total))
    })
}

/// Send `envelope`, re-sending at `interval` while the network answers
/// TRY_AGAIN_LATER and `deadline` has not passed
pub(crate) async fn send_until_accepted<R: SorobanRpc>(
    rpc: &R,
    envelope: &TransactionEnvelope,
    interval: Duration,
    deadline: Instant,
) -> Result<SendTransactionResponse, InvokeError> {
    loop {
        let response = rpc.send_transaction(envelope).await?;
        if response.status != SendStatus::TryAgainLater || Instant::now() >= deadline {
            return Ok(response);
        }
        warn!(hash = %response.hash, "Network busy (TRY_AGAIN_LATER), re-sending");
        tokio::time::sleep(interval).await;
    }
}

/// Query `hash` at `interval` until it is no longer NOT_FOUND
pub(crate) async fn poll_until_final<R: SorobanRpc>(
    rpc: &R,
    hash: &str,
    interval: Duration,
    started: Instant,
    window: Duration,
) -> Result<GetTransactionResponse, InvokeError> {
    loop {
        let response = rpc.get_transaction(hash).await?;
        if response.status != TransactionStatus::NotFound {
            return Ok(response);
        }

        let waited = started.elapsed();
        if waited >= window {
            return Err(InvokeError::Timeout {
                hash: hash.to_string(),
                waited_secs: waited.as_secs(),
            });
        }
        debug!(hash, waited_ms = waited.as_millis() as u64, "Transaction not in a ledger yet");
        tokio::time::sleep(interval.min(window - waited)).await;
    }
}
