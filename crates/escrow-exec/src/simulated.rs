//! In-memory chain hosting both registries, plus a wallet provider and signer
//! bound to it. Used by the demo and by every async test in this crate.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use async_trait::async_trait;
use escrow_core::AbiValue;
use escrow_core::Address;
use escrow_core::AmountWei;
use escrow_core::OperationId;
use escrow_core::OperationRegistry;
use escrow_core::RegistryAddresses;
use escrow_core::TaskId;
use escrow_core::TaskRecord;
use escrow_core::TxHash;
use tokio::sync::broadcast;
use tracing::debug;

use crate::contracts::AccountEvent;
use crate::contracts::ContractCall;
use crate::contracts::ProviderError;
use crate::contracts::ReadTransport;
use crate::contracts::Receipt;
use crate::contracts::ReceiptStatus;
use crate::contracts::Signer;
use crate::contracts::TransportError;
use crate::contracts::WalletProvider;

#[derive(Debug, Default)]
struct ChainState {
    /// Parent to `(child, commitment)` in registration order.
    children: BTreeMap<Address, Vec<(Address, Vec<u8>)>>,
    tasks: BTreeMap<u64, TaskRecord>,
    receipts: HashMap<TxHash, Receipt>,
    block_number: u64,
    tx_nonce: u64,
    withhold_receipts: bool,
    receipt_error: Option<String>,
    reject_next_submission: Option<String>,
    stall_reads: bool,
    stall_submissions: bool,
    read_calls: usize,
    submissions: usize,
}

/// Cheap to clone; all clones share one chain.
#[derive(Debug, Clone)]
pub struct SimulatedChain {
    registries: RegistryAddresses,
    state: Arc<Mutex<ChainState>>,
}

impl Default for SimulatedChain {
    fn default() -> Self {
        Self::new(RegistryAddresses::default())
    }
}

impl SimulatedChain {
    pub fn new(registries: RegistryAddresses) -> Self {
        Self {
            registries,
            state: Arc::new(Mutex::new(ChainState::default())),
        }
    }

    pub fn registries(&self) -> RegistryAddresses {
        self.registries
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// While set, transactions are still executed but their receipts are not reported.
    pub fn withhold_receipts(&self, withhold: bool) {
        self.lock().withhold_receipts = withhold;
    }

    /// While set, every receipt lookup fails with this transport error.
    pub fn fail_receipts(&self, error: Option<&str>) {
        self.lock().receipt_error = error.map(str::to_string);
    }

    pub fn reject_next_submission(&self, reason: &str) {
        self.lock().reject_next_submission = Some(reason.to_string());
    }

    /// While set, reads never answer.
    pub fn stall_reads(&self, stall: bool) {
        self.lock().stall_reads = stall;
    }

    /// While set, signing requests are never answered, as with an ignored
    /// wallet prompt.
    pub fn stall_submissions(&self, stall: bool) {
        self.lock().stall_submissions = stall;
    }

    fn submissions_stalled(&self) -> bool {
        self.lock().stall_submissions
    }

    pub fn read_calls(&self) -> usize {
        self.lock().read_calls
    }

    pub fn submissions(&self) -> usize {
        self.lock().submissions
    }

    /// Network interactions of any kind.
    pub fn network_calls(&self) -> usize {
        let state = self.lock();
        state.read_calls + state.submissions
    }

    pub fn task(&self, id: TaskId) -> Option<TaskRecord> {
        self.lock().tasks.get(&id.0).cloned()
    }

    fn operation_for(&self, call: &ContractCall) -> Result<OperationId, String> {
        let registry = self
            .registries
            .registry_at(call.to)
            .ok_or_else(|| format!("no registry deployed at {}", call.to))?;
        OperationRegistry::by_function(registry, call.function)
            .map(|spec| spec.id)
            .ok_or_else(|| format!("{} has no function {}", registry.label(), call.function))
    }

    fn submit(&self, from: Address, call: ContractCall) -> Result<TxHash, ProviderError> {
        let mut state = self.lock();
        state.submissions += 1;
        if let Some(reason) = state.reject_next_submission.take() {
            return Err(ProviderError::Rejected(reason));
        }

        state.tx_nonce += 1;
        state.block_number += 1;
        let tx_hash = TxHash::from_low_u64(state.tx_nonce);
        let status = match self
            .operation_for(&call)
            .and_then(|operation| execute(&mut state, from, operation, &call))
        {
            Ok(()) => ReceiptStatus::Success,
            Err(reason) => ReceiptStatus::Reverted { reason },
        };
        debug!(%tx_hash, function = call.function, ?status, "simulated transaction mined");
        let block_number = state.block_number;
        state.receipts.insert(
            tx_hash,
            Receipt {
                tx_hash,
                status,
                block_number,
            },
        );
        Ok(tx_hash)
    }

    fn receipt(&self, hash: TxHash) -> Result<Option<Receipt>, TransportError> {
        let state = self.lock();
        if let Some(error) = &state.receipt_error {
            return Err(TransportError::Network(error.clone()));
        }
        if state.withhold_receipts {
            return Ok(None);
        }
        Ok(state.receipts.get(&hash).cloned())
    }

    fn query(&self, call: &ContractCall) -> Result<AbiValue, TransportError> {
        let operation = self.operation_for(call).map_err(TransportError::Reverted)?;
        let state = self.lock();
        read(&state, operation, &call.arguments).map_err(TransportError::Reverted)
    }
}

fn address_arg(arguments: &[AbiValue], index: usize) -> Result<Address, String> {
    arguments
        .get(index)
        .and_then(AbiValue::as_address)
        .ok_or_else(|| format!("argument {index} is not an address"))
}

fn uint_arg(arguments: &[AbiValue], index: usize) -> Result<u128, String> {
    arguments
        .get(index)
        .and_then(AbiValue::as_uint)
        .ok_or_else(|| format!("argument {index} is not a uint256"))
}

fn task_id_arg(arguments: &[AbiValue], index: usize) -> Result<u64, String> {
    let raw = uint_arg(arguments, index)?;
    u64::try_from(raw).map_err(|_| "task does not exist".to_string())
}

fn execute(
    state: &mut ChainState,
    from: Address,
    operation: OperationId,
    call: &ContractCall,
) -> Result<(), String> {
    let arguments = &call.arguments;
    if operation != OperationId::CreateTask && call.value.is_some_and(|value| value.0 > 0) {
        return Err("function is not payable".to_string());
    }
    match operation {
        OperationId::RegisterChild => {
            let child = address_arg(arguments, 0)?;
            let Some(AbiValue::String(secret)) = arguments.get(1) else {
                return Err("argument 1 is not a string".to_string());
            };
            if child == Address::ZERO {
                return Err("invalid child address".to_string());
            }
            let entries = state.children.entry(from).or_default();
            if entries.iter().any(|(existing, _)| *existing == child) {
                return Err("child already registered".to_string());
            }
            // The simulated registry keeps the secret bytes as the commitment.
            entries.push((child, secret.as_bytes().to_vec()));
            Ok(())
        }
        OperationId::CreateTask => {
            let child = address_arg(arguments, 0)?;
            let amount = uint_arg(arguments, 1)?;
            if child == Address::ZERO {
                return Err("invalid child address".to_string());
            }
            if amount == 0 {
                return Err("amount must be positive".to_string());
            }
            if call.value != Some(AmountWei(amount)) {
                return Err("sent value does not match amount".to_string());
            }
            let id = state.tasks.len() as u64 + 1;
            state.tasks.insert(
                id,
                TaskRecord {
                    id: TaskId(id),
                    parent: from,
                    child,
                    amount: AmountWei(amount),
                    released: false,
                },
            );
            Ok(())
        }
        OperationId::ReleaseTask => {
            let id = task_id_arg(arguments, 0)?;
            let task = state
                .tasks
                .get_mut(&id)
                .ok_or_else(|| "task does not exist".to_string())?;
            if task.parent != from {
                return Err("only the parent can release this task".to_string());
            }
            if task.released {
                return Err("task already released".to_string());
            }
            task.released = true;
            Ok(())
        }
        other => Err(format!("{} is not a transaction", other.as_str())),
    }
}

fn task_ids(state: &ChainState, matches: impl Fn(&TaskRecord) -> bool) -> AbiValue {
    AbiValue::Array(
        state
            .tasks
            .values()
            .filter(|task| matches(task))
            .map(|task| AbiValue::Uint(u128::from(task.id.0)))
            .collect(),
    )
}

fn read(state: &ChainState, operation: OperationId, arguments: &[AbiValue]) -> Result<AbiValue, String> {
    match operation {
        OperationId::CountChildren => {
            let parent = address_arg(arguments, 0)?;
            let count = state.children.get(&parent).map_or(0, Vec::len);
            Ok(AbiValue::Uint(count as u128))
        }
        OperationId::ListChildren => {
            let parent = address_arg(arguments, 0)?;
            let entries = state
                .children
                .get(&parent)
                .map(|entries| {
                    entries
                        .iter()
                        .map(|(child, commitment)| {
                            AbiValue::Tuple(vec![
                                AbiValue::Address(*child),
                                AbiValue::Bytes(commitment.clone()),
                            ])
                        })
                        .collect()
                })
                .unwrap_or_default();
            Ok(AbiValue::Array(entries))
        }
        OperationId::TasksByParent => {
            let parent = address_arg(arguments, 0)?;
            Ok(task_ids(state, |task| task.parent == parent))
        }
        OperationId::TasksByChild => {
            let child = address_arg(arguments, 0)?;
            Ok(task_ids(state, |task| task.child == child))
        }
        OperationId::TaskDetails => {
            let id = task_id_arg(arguments, 0)?;
            let task = state
                .tasks
                .get(&id)
                .ok_or_else(|| "task does not exist".to_string())?;
            Ok(AbiValue::Tuple(vec![
                AbiValue::Uint(u128::from(task.id.0)),
                AbiValue::Address(task.parent),
                AbiValue::Address(task.child),
                AbiValue::Uint(task.amount.0),
                AbiValue::Bool(task.released),
            ]))
        }
        OperationId::HasSufficientBalance => {
            let id = task_id_arg(arguments, 0)?;
            let task = state
                .tasks
                .get(&id)
                .ok_or_else(|| "task does not exist".to_string())?;
            Ok(AbiValue::Bool(!task.released && task.amount.0 > 0))
        }
        other => Err(format!("{} requires a transaction", other.as_str())),
    }
}

#[async_trait]
impl ReadTransport for SimulatedChain {
    async fn call(&self, call: ContractCall) -> Result<AbiValue, TransportError> {
        let stalled = {
            let mut state = self.lock();
            state.read_calls += 1;
            state.stall_reads
        };
        if stalled {
            std::future::pending::<()>().await;
        }
        self.query(&call)
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedSigner {
    chain: SimulatedChain,
    address: Address,
}

impl SimulatedSigner {
    pub fn new(chain: SimulatedChain, address: Address) -> Self {
        Self { chain, address }
    }
}

#[async_trait]
impl Signer for SimulatedSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn send_transaction(&self, call: ContractCall) -> Result<TxHash, ProviderError> {
        if self.chain.submissions_stalled() {
            std::future::pending::<()>().await;
        }
        self.chain.submit(self.address, call)
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<Receipt>, TransportError> {
        self.chain.receipt(hash)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalletMode {
    Available { signing: bool },
    Absent,
    Rejecting,
}

/// Wallet provider backed by a [`SimulatedChain`].
#[derive(Debug)]
pub struct SimulatedWallet {
    chain: SimulatedChain,
    account: Mutex<Address>,
    mode: WalletMode,
    events: broadcast::Sender<AccountEvent>,
}

impl SimulatedWallet {
    fn with_mode(chain: SimulatedChain, account: Address, mode: WalletMode) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            chain,
            account: Mutex::new(account),
            mode,
            events,
        }
    }

    pub fn new(chain: SimulatedChain, account: Address) -> Self {
        Self::with_mode(chain, account, WalletMode::Available { signing: true })
    }

    /// Exposes an account but no signer.
    pub fn read_only(chain: SimulatedChain, account: Address) -> Self {
        Self::with_mode(chain, account, WalletMode::Available { signing: false })
    }

    pub fn absent(chain: SimulatedChain) -> Self {
        Self::with_mode(chain, Address::ZERO, WalletMode::Absent)
    }

    /// Declines every account request.
    pub fn rejecting(chain: SimulatedChain) -> Self {
        Self::with_mode(chain, Address::ZERO, WalletMode::Rejecting)
    }

    fn account(&self) -> Address {
        *self.account.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn switch_account(&self, account: Address) {
        *self.account.lock().unwrap_or_else(PoisonError::into_inner) = account;
        let _ = self.events.send(AccountEvent::Changed(account));
    }

    pub fn disconnect(&self) {
        let _ = self.events.send(AccountEvent::Disconnected);
    }
}

#[async_trait]
impl WalletProvider for SimulatedWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        match self.mode {
            WalletMode::Absent => Err(ProviderError::NotInstalled),
            WalletMode::Rejecting => Err(ProviderError::Rejected(
                "user denied account authorization".to_string(),
            )),
            WalletMode::Available { .. } => Ok(vec![self.account()]),
        }
    }

    async fn signer(&self) -> Result<Option<Arc<dyn Signer>>, ProviderError> {
        match self.mode {
            WalletMode::Absent => Err(ProviderError::NotInstalled),
            WalletMode::Rejecting => Err(ProviderError::Rejected(
                "user denied account authorization".to_string(),
            )),
            WalletMode::Available { signing: false } => Ok(None),
            WalletMode::Available { signing: true } => Ok(Some(Arc::new(SimulatedSigner::new(
                self.chain.clone(),
                self.account(),
            )))),
        }
    }

    fn account_events(&self) -> Option<broadcast::Receiver<AccountEvent>> {
        match self.mode {
            WalletMode::Absent => None,
            _ => Some(self.events.subscribe()),
        }
    }
}

#[cfg(test)]
mod tests {
    use escrow_core::CallRequest;
    use pretty_assertions::assert_eq;

    use super::*;

    fn parent() -> Address {
        Address::from_low_u64(0x123)
    }

    fn child() -> Address {
        Address::from_low_u64(0x456)
    }

    fn call(chain: &SimulatedChain, request: CallRequest) -> ContractCall {
        ContractCall::for_request(&request, &chain.registries())
    }

    fn receipt_status(chain: &SimulatedChain, hash: TxHash) -> ReceiptStatus {
        chain.receipt(hash).expect("receipt").expect("mined").status
    }

    #[test]
    fn create_task_escrows_and_lists_by_both_parties() {
        let chain = SimulatedChain::default();
        let hash = chain
            .submit(parent(), call(&chain, CallRequest::create_task(child(), AmountWei(10))))
            .expect("submit");
        assert_eq!(receipt_status(&chain, hash), ReceiptStatus::Success);

        let by_child = chain
            .query(&call(&chain, CallRequest::tasks_by_child(child())))
            .expect("read");
        assert_eq!(by_child, AbiValue::Array(vec![AbiValue::Uint(1)]));
        let by_parent = chain
            .query(&call(&chain, CallRequest::tasks_by_parent(parent())))
            .expect("read");
        assert_eq!(by_parent, by_child);
        assert_eq!(chain.task(TaskId(1)).map(|task| task.amount), Some(AmountWei(10)));
    }

    #[test]
    fn release_reverts_for_unknown_foreign_and_released_tasks() {
        let chain = SimulatedChain::default();
        let unknown = chain
            .submit(parent(), call(&chain, CallRequest::release_task(TaskId(999))))
            .expect("submit");
        assert_eq!(
            receipt_status(&chain, unknown),
            ReceiptStatus::Reverted {
                reason: "task does not exist".to_string()
            }
        );

        chain
            .submit(parent(), call(&chain, CallRequest::create_task(child(), AmountWei(5))))
            .expect("submit");
        let foreign = chain
            .submit(child(), call(&chain, CallRequest::release_task(TaskId(1))))
            .expect("submit");
        assert!(matches!(
            receipt_status(&chain, foreign),
            ReceiptStatus::Reverted { .. }
        ));

        let first = chain
            .submit(parent(), call(&chain, CallRequest::release_task(TaskId(1))))
            .expect("submit");
        assert_eq!(receipt_status(&chain, first), ReceiptStatus::Success);
        let second = chain
            .submit(parent(), call(&chain, CallRequest::release_task(TaskId(1))))
            .expect("submit");
        assert_eq!(
            receipt_status(&chain, second),
            ReceiptStatus::Reverted {
                reason: "task already released".to_string()
            }
        );
    }

    #[test]
    fn value_mismatch_reverts_on_chain() {
        let chain = SimulatedChain::default();
        let mut contract_call = call(&chain, CallRequest::create_task(child(), AmountWei(10)));
        contract_call.value = Some(AmountWei(9));
        let hash = chain.submit(parent(), contract_call).expect("submit");
        assert!(matches!(
            receipt_status(&chain, hash),
            ReceiptStatus::Reverted { .. }
        ));
        assert_eq!(chain.task(TaskId(1)), None);
    }

    #[test]
    fn children_are_listed_in_registration_order() {
        let chain = SimulatedChain::default();
        for (value, secret) in [(0x10, "a"), (0x11, "b")] {
            chain
                .submit(
                    parent(),
                    call(&chain, CallRequest::register_child(Address::from_low_u64(value), secret)),
                )
                .expect("submit");
        }
        let count = chain
            .query(&call(&chain, CallRequest::count_children(parent())))
            .expect("read");
        assert_eq!(count, AbiValue::Uint(2));

        let listed = chain
            .query(&call(&chain, CallRequest::list_children(parent())))
            .expect("read");
        let AbiValue::Array(entries) = listed else {
            panic!("expected array");
        };
        assert_eq!(
            entries[0],
            AbiValue::Tuple(vec![
                AbiValue::Address(Address::from_low_u64(0x10)),
                AbiValue::Bytes(b"a".to_vec()),
            ])
        );
    }

    #[test]
    fn rejected_submission_is_counted_but_not_mined() {
        let chain = SimulatedChain::default();
        chain.reject_next_submission("declined");
        let err = chain
            .submit(parent(), call(&chain, CallRequest::release_task(TaskId(1))))
            .unwrap_err();
        assert_eq!(err, ProviderError::Rejected("declined".to_string()));
        assert_eq!(chain.submissions(), 1);
        assert!(chain
            .submit(parent(), call(&chain, CallRequest::release_task(TaskId(1))))
            .is_ok());
    }

    #[test]
    fn withheld_receipts_are_reported_after_release() {
        let chain = SimulatedChain::default();
        chain.withhold_receipts(true);
        let hash = chain
            .submit(parent(), call(&chain, CallRequest::create_task(child(), AmountWei(1))))
            .expect("submit");
        assert_eq!(chain.receipt(hash), Ok(None));
        chain.withhold_receipts(false);
        assert_eq!(receipt_status(&chain, hash), ReceiptStatus::Success);
    }

    #[tokio::test]
    async fn absent_wallet_reports_not_installed() {
        let wallet = SimulatedWallet::absent(SimulatedChain::default());
        assert_eq!(
            wallet.request_accounts().await,
            Err(ProviderError::NotInstalled)
        );
        assert!(wallet.account_events().is_none());
    }

    #[tokio::test]
    async fn read_only_wallet_has_no_signer() {
        let wallet = SimulatedWallet::read_only(SimulatedChain::default(), parent());
        assert_eq!(wallet.request_accounts().await, Ok(vec![parent()]));
        assert!(wallet.signer().await.expect("signer").is_none());
    }
}
