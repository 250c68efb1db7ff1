//! In-memory doubles for the wallet provider and the vault contracts.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tv_api_types::protocol::{BPS_DENOMINATOR, CREATOR_FEE_BPS, EMERGENCY_PENALTY_BPS};
use tv_api_types::{ChainId, DepositRecord, TxHash, WalletAddress};
use tv_chain_client::error::METHOD_NOT_FOUND;
use tv_chain_client::{
    ContractAddresses, ProviderError, ProviderEvent, ProviderEvents, ProviderSubscription,
    TxReceipt, TxReverted, VaultContracts, WalletProvider,
};

use crate::unix_now;

/// Provider answering from per-method queues, then per-method defaults,
/// then "method not found".
#[derive(Default)]
pub struct MockProvider {
    queued: Mutex<HashMap<String, VecDeque<Result<Value, ProviderError>>>>,
    sticky: Mutex<HashMap<String, Result<Value, ProviderError>>>,
    calls: Mutex<Vec<(String, Value)>>,
    events: ProviderEvents,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A wallet with one authorized account on `chain_id`.
    pub fn wallet(address: &str, chain_id: ChainId) -> Arc<Self> {
        let provider = Self::new();
        provider.respond_always("eth_requestAccounts", Ok(json!([address])));
        provider.respond_always("eth_accounts", Ok(json!([address])));
        provider.respond_always("eth_chainId", Ok(json!(chain_id.to_hex())));
        provider
    }

    pub fn respond(&self, method: &str, result: Result<Value, ProviderError>) {
        let mut queued = self.queued.lock().unwrap();
        queued.entry(method.to_owned()).or_default().push_back(result);
    }

    pub fn respond_always(&self, method: &str, result: Result<Value, ProviderError>) {
        self.sticky.lock().unwrap().insert(method.to_owned(), result);
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|(method, _)| method).collect()
    }

    pub fn emit(&self, event: ProviderEvent) -> usize {
        self.events.emit(event)
    }
}

#[async_trait]
impl WalletProvider for MockProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.calls.lock().unwrap().push((method.to_owned(), params));

        if let Some(result) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front)
        {
            return result;
        }

        self.sticky
            .lock()
            .unwrap()
            .get(method)
            .cloned()
            .unwrap_or_else(|| {
                Err(ProviderError::rpc(METHOD_NOT_FOUND, format!("{method} not found")))
            })
    }

    fn subscribe(&self) -> ProviderSubscription {
        self.events.subscribe()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    TokenBalance(WalletAddress),
    TokenAllowance(WalletAddress),
    Approve { spender: WalletAddress, amount: u128 },
    NextDepositId,
    DepositRecord(u64),
    Withdraw(u64),
    EmergencyWithdraw(u64),
    RouterDeposit { amount: u128, duration: u64 },
    WaitForReceipt(TxHash),
}

#[derive(Default)]
struct Ledger {
    balance: u128,
    allowance: u128,
    deposits: Vec<DepositRecord>,
    reject_writes: bool,
    revert_next: bool,
    fail_reads: bool,
    unreadable: Vec<u64>,
    hold_receipts: bool,
    tx_counter: u64,
}

/// Contract double with a single-account token ledger and a deposit table
/// indexed from 1.
pub struct MockContracts {
    addresses: ContractAddresses,
    ledger: Mutex<Ledger>,
    calls: Mutex<Vec<ContractCall>>,
    receipts: Notify,
}

impl Default for MockContracts {
    fn default() -> Self {
        Self {
            addresses: ContractAddresses::base_mainnet(),
            ledger: Mutex::default(),
            calls: Mutex::default(),
            receipts: Notify::new(),
        }
    }
}

impl MockContracts {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_balance(&self, balance: u128) {
        self.ledger.lock().unwrap().balance = balance;
    }

    pub fn set_allowance(&self, allowance: u128) {
        self.ledger.lock().unwrap().allowance = allowance;
    }

    /// Appends a deposit slot; its id is its 1-based position.
    pub fn add_deposit(
        &self,
        owner: &str,
        principal: u128,
        start_time: u64,
        unlock_time: u64,
    ) -> u64 {
        let mut ledger = self.ledger.lock().unwrap();
        let id = ledger.deposits.len() as u64 + 1;
        ledger.deposits.push(DepositRecord {
            id,
            owner: WalletAddress(owner.to_owned()),
            principal,
            start_time,
            unlock_time,
            withdrawn: false,
        });
        id
    }

    pub fn reject_writes(&self, reject: bool) {
        self.ledger.lock().unwrap().reject_writes = reject;
    }

    pub fn revert_next(&self) {
        self.ledger.lock().unwrap().revert_next = true;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.ledger.lock().unwrap().fail_reads = fail;
    }

    pub fn make_unreadable(&self, deposit_id: u64) {
        self.ledger.lock().unwrap().unreadable.push(deposit_id);
    }

    /// Leave receipts unresolved until `release_receipts`.
    pub fn hold_receipts(&self) {
        self.ledger.lock().unwrap().hold_receipts = true;
    }

    pub fn release_receipts(&self) {
        self.ledger.lock().unwrap().hold_receipts = false;
        self.receipts.notify_waiters();
    }

    pub fn calls(&self) -> Vec<ContractCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn deposits(&self) -> Vec<DepositRecord> {
        self.ledger.lock().unwrap().deposits.clone()
    }

    fn log(&self, call: ContractCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn read_guard(&self) -> Result<()> {
        if self.ledger.lock().unwrap().fail_reads {
            return Err(ProviderError::Transport("connection refused".into()).into());
        }
        Ok(())
    }

    fn write<F>(&self, apply: F) -> Result<TxHash>
    where
        F: FnOnce(&mut Ledger) -> Result<()>,
    {
        let mut ledger = self.ledger.lock().unwrap();
        if ledger.reject_writes {
            return Err(ProviderError::rpc(4001, "User rejected the request.").into());
        }
        apply(&mut ledger)?;
        ledger.tx_counter += 1;
        Ok(TxHash(format!("0x{:064x}", ledger.tx_counter)))
    }
}

#[async_trait]
impl VaultContracts for MockContracts {
    fn addresses(&self) -> &ContractAddresses {
        &self.addresses
    }

    async fn token_balance(&self, owner: &WalletAddress) -> Result<u128> {
        self.log(ContractCall::TokenBalance(owner.clone()));
        self.read_guard()?;
        Ok(self.ledger.lock().unwrap().balance)
    }

    async fn token_allowance(
        &self,
        owner: &WalletAddress,
        _spender: &WalletAddress,
    ) -> Result<u128> {
        self.log(ContractCall::TokenAllowance(owner.clone()));
        self.read_guard()?;
        Ok(self.ledger.lock().unwrap().allowance)
    }

    async fn approve(
        &self,
        _from: &WalletAddress,
        spender: &WalletAddress,
        amount: u128,
    ) -> Result<TxHash> {
        self.log(ContractCall::Approve {
            spender: spender.clone(),
            amount,
        });
        self.write(|ledger| {
            ledger.allowance = amount;
            Ok(())
        })
    }

    async fn next_deposit_id(&self) -> Result<u64> {
        self.log(ContractCall::NextDepositId);
        self.read_guard()?;
        Ok(self.ledger.lock().unwrap().deposits.len() as u64 + 1)
    }

    async fn deposit_record(&self, deposit_id: u64) -> Result<DepositRecord> {
        self.log(ContractCall::DepositRecord(deposit_id));
        self.read_guard()?;
        let ledger = self.ledger.lock().unwrap();
        if ledger.unreadable.contains(&deposit_id) {
            anyhow::bail!("deposit {deposit_id} unreadable");
        }
        ledger
            .deposits
            .get(deposit_id.saturating_sub(1) as usize)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("deposit {deposit_id} does not exist"))
    }

    async fn vault_withdraw(&self, from: &WalletAddress, deposit_id: u64) -> Result<TxHash> {
        self.log(ContractCall::Withdraw(deposit_id));
        self.write(|ledger| {
            let record = owned_slot(ledger, from, deposit_id)?;
            if unix_now() < record.unlock_time {
                anyhow::bail!("execution reverted: Still locked");
            }
            record.withdrawn = true;
            let principal = record.principal;
            ledger.balance += principal;
            Ok(())
        })
    }

    async fn vault_emergency_withdraw(
        &self,
        from: &WalletAddress,
        deposit_id: u64,
    ) -> Result<TxHash> {
        self.log(ContractCall::EmergencyWithdraw(deposit_id));
        self.write(|ledger| {
            let record = owned_slot(ledger, from, deposit_id)?;
            record.withdrawn = true;
            let principal = record.principal;
            ledger.balance += principal - principal * EMERGENCY_PENALTY_BPS / BPS_DENOMINATOR;
            Ok(())
        })
    }

    async fn router_deposit(
        &self,
        from: &WalletAddress,
        gross_amount: u128,
        duration: u64,
    ) -> Result<TxHash> {
        self.log(ContractCall::RouterDeposit {
            amount: gross_amount,
            duration,
        });
        self.write(|ledger| {
            if ledger.allowance < gross_amount || ledger.balance < gross_amount {
                anyhow::bail!("execution reverted: ERC20: insufficient allowance");
            }
            ledger.allowance -= gross_amount;
            ledger.balance -= gross_amount;

            let now = unix_now();
            let id = ledger.deposits.len() as u64 + 1;
            ledger.deposits.push(DepositRecord {
                id,
                owner: from.clone(),
                principal: gross_amount - gross_amount * CREATOR_FEE_BPS / BPS_DENOMINATOR,
                start_time: now,
                unlock_time: now + duration,
                withdrawn: false,
            });
            Ok(())
        })
    }

    async fn wait_for_receipt(&self, hash: &TxHash) -> Result<TxReceipt> {
        self.log(ContractCall::WaitForReceipt(hash.clone()));
        loop {
            let released = self.receipts.notified();
            let held = self.ledger.lock().unwrap().hold_receipts;
            if !held {
                break;
            }
            released.await;
        }

        let mut ledger = self.ledger.lock().unwrap();
        let block_number = Some(1_000 + ledger.tx_counter);
        if std::mem::take(&mut ledger.revert_next) {
            return Err(TxReverted {
                hash: hash.clone(),
                block_number,
            }
            .into());
        }
        Ok(TxReceipt {
            hash: hash.clone(),
            block_number,
        })
    }
}

fn owned_slot<'a>(
    ledger: &'a mut Ledger,
    from: &WalletAddress,
    deposit_id: u64,
) -> Result<&'a mut DepositRecord> {
    let record = ledger
        .deposits
        .get_mut(deposit_id.saturating_sub(1) as usize)
        .ok_or_else(|| anyhow::anyhow!("execution reverted: unknown deposit"))?;
    if !record.owner.matches(from) || record.withdrawn {
        anyhow::bail!("execution reverted: not withdrawable");
    }
    Ok(record)
}
