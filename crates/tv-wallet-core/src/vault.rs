//! Read model of the connected account's vault position and the
//! transaction lifecycle that mutates it.
//!
//! State is recomputed wholesale: after every confirmed transaction, on
//! account changes and on network changes. Concurrent refreshes are allowed
//! and the last write wins. `tx_pending` is advisory; callers that need
//! mutual exclusion check it before submitting.

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use tv_api_types::protocol::USDC_DECIMALS;
use tv_api_types::{
    DepositRecord, TransactionRecord, TxHash, TxKind, TxPhase, TxRecordStatus, WalletAddress,
    WithdrawAction,
};
use tv_chain_client::VaultContracts;
use tv_format::to_base_units;
use tv_storage::{RecentTxHashes, Storage, TransactionHistory};

use crate::error::{ConnectError, contract_error_message};
use crate::events::{AppEvent, EventBus};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultClientState {
    pub usdc_balance: u128,
    pub allowance: u128,
    /// Deposits owned by the account, in id order.
    pub deposits: Vec<DepositRecord>,
    pub is_loading: bool,
    pub tx_pending: bool,
    pub tx_status: Option<String>,
    pub tx_phase: TxPhase,
}

impl VaultClientState {
    /// Principal still held by the vault.
    pub fn total_locked(&self) -> u128 {
        self.deposits
            .iter()
            .filter(|deposit| !deposit.withdrawn)
            .map(|deposit| deposit.principal)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome {
    pub hash: TxHash,
    pub block_number: Option<u64>,
}

/// Which withdraw path a deposit offers at `now`.
pub fn withdraw_action(record: &DepositRecord, now: u64) -> Option<WithdrawAction> {
    if record.withdrawn {
        None
    } else if record.is_unlocked(now) {
        Some(WithdrawAction::Withdraw)
    } else {
        Some(WithdrawAction::EmergencyWithdraw)
    }
}

pub struct VaultSync {
    contracts: Arc<dyn VaultContracts>,
    account: RwLock<Option<WalletAddress>>,
    state: RwLock<VaultClientState>,
    events: EventBus,
    history: Option<TransactionHistory>,
    recent: Option<RecentTxHashes>,
}

impl VaultSync {
    pub fn new(contracts: Arc<dyn VaultContracts>, events: EventBus) -> Self {
        Self {
            contracts,
            account: RwLock::new(None),
            state: RwLock::new(VaultClientState::default()),
            events,
            history: None,
            recent: None,
        }
    }

    /// Record every submitted transaction in `storage`.
    pub fn with_storage(mut self, storage: Storage) -> Self {
        self.history = Some(TransactionHistory::new(storage.clone()));
        self.recent = Some(RecentTxHashes::new(storage));
        self
    }

    pub fn contracts(&self) -> &Arc<dyn VaultContracts> {
        &self.contracts
    }

    pub async fn account(&self) -> Option<WalletAddress> {
        self.account.read().await.clone()
    }

    pub async fn state(&self) -> VaultClientState {
        self.state.read().await.clone()
    }

    /// Switch the synchronized account. State is cleared, then fully re-read
    /// when an account is given.
    pub async fn bind(&self, account: Option<WalletAddress>) {
        let bound = account.as_ref().map_or("nobody".to_owned(), ToString::to_string);
        info!("vault sync bound to {bound}");
        *self.account.write().await = account.clone();
        *self.state.write().await = VaultClientState::default();
        if account.is_some() {
            self.refresh().await;
        }
    }

    /// Clear state and resynchronize the current account.
    pub async fn reload(&self) {
        let account = self.account().await;
        self.bind(account).await;
    }

    pub async fn refresh(&self) {
        tokio::join!(self.refresh_balances(), self.refresh_deposits());
    }

    async fn still_bound_to(&self, owner: &WalletAddress) -> bool {
        self.account
            .read()
            .await
            .as_ref()
            .is_some_and(|current| current.matches(owner))
    }

    /// Read failures are logged and leave the previous values in place.
    pub async fn refresh_balances(&self) {
        let Some(owner) = self.account().await else {
            return;
        };
        let router = self.contracts.addresses().vault_router.clone();

        let (balance, allowance) = tokio::join!(
            self.contracts.token_balance(&owner),
            self.contracts.token_allowance(&owner, &router),
        );

        match (balance, allowance) {
            (Ok(balance), Ok(allowance)) => {
                if !self.still_bound_to(&owner).await {
                    debug!("discarding balances for {owner}, account changed");
                    return;
                }
                let mut state = self.state.write().await;
                state.usdc_balance = balance;
                state.allowance = allowance;
            }
            (Err(err), _) | (_, Err(err)) => warn!("balance refresh for {owner} failed: {err:#}"),
        }
    }

    /// Scan every deposit slot and keep those owned by the account.
    pub async fn refresh_deposits(&self) {
        let Some(owner) = self.account().await else {
            return;
        };
        self.state.write().await.is_loading = true;

        let deposits = match self.contracts.next_deposit_id().await {
            Ok(next_id) => {
                let mut owned = Vec::new();
                for id in 1..next_id {
                    match self.contracts.deposit_record(id).await {
                        Ok(record) if record.owner.matches(&owner) => owned.push(record),
                        Ok(_) => {}
                        Err(err) => debug!("skipping deposit {id}: {err:#}"),
                    }
                }
                Some(owned)
            }
            Err(err) => {
                warn!("deposit scan for {owner} failed: {err:#}");
                None
            }
        };

        let bound = self.still_bound_to(&owner).await;
        let mut state = self.state.write().await;
        state.is_loading = false;
        match deposits {
            Some(deposits) if bound => state.deposits = deposits,
            Some(_) => debug!("discarding deposits for {owner}, account changed"),
            None => {}
        }
    }

    async fn require_account(&self) -> Result<WalletAddress> {
        self.account().await.ok_or_else(|| ConnectError::NotConnected.into())
    }

    async fn set_phase(&self, phase: TxPhase) {
        self.state.write().await.tx_phase = phase;
    }

    async fn set_status(&self, status: &str) {
        self.state.write().await.tx_status = Some(status.to_owned());
    }

    async fn begin(&self) {
        let mut state = self.state.write().await;
        state.tx_pending = true;
        state.tx_status = None;
        state.tx_phase = TxPhase::Submitting;
    }

    /// Close a transaction: resync on success, record the error otherwise.
    /// Either way `tx_pending` is cleared and the phase ends at idle.
    async fn finish(
        &self,
        kind: TxKind,
        result: Result<TxOutcome>,
        success: &str,
    ) -> Result<TxOutcome> {
        match result {
            Ok(outcome) => {
                {
                    let mut state = self.state.write().await;
                    state.tx_status = Some(success.to_owned());
                    state.tx_phase = TxPhase::Confirmed;
                }
                self.set_phase(TxPhase::Resyncing).await;
                self.refresh().await;

                let mut state = self.state.write().await;
                state.tx_pending = false;
                state.tx_phase = TxPhase::Idle;
                Ok(outcome)
            }
            Err(err) => {
                warn!("{} failed: {err:#}", kind.label());
                {
                    let mut state = self.state.write().await;
                    state.tx_status = Some(format!("Error: {}", err.root_cause()));
                    state.tx_phase = TxPhase::Failed;
                    state.tx_pending = false;
                }
                // The error stays in tx_status; the phase is ready for a retry.
                self.set_phase(TxPhase::Idle).await;
                Err(err)
            }
        }
    }

    async fn journal_pending(
        &self,
        hash: &TxHash,
        kind: TxKind,
        amount: Option<&str>,
        deposit_id: Option<u64>,
    ) {
        if let Some(history) = &self.history {
            let record = TransactionRecord {
                hash: hash.0.clone(),
                kind,
                amount: amount.map(str::to_owned),
                deposit_id,
                timestamp: 0,
                status: TxRecordStatus::Pending,
                block_number: None,
            };
            if let Err(err) = history.add(record).await {
                warn!("could not record {hash} in history: {err:#}");
            }
        }
        if let Some(recent) = &self.recent {
            if let Err(err) = recent.push(&hash.0).await {
                warn!("could not record {hash} in recent list: {err:#}");
            }
        }
    }

    async fn journal_status(
        &self,
        hash: &TxHash,
        status: TxRecordStatus,
        block_number: Option<u64>,
    ) {
        if let Some(history) = &self.history {
            if let Err(err) = history.update_status(&hash.0, status, block_number).await {
                warn!("could not update {hash} in history: {err:#}");
            }
        }
    }

    /// Submit one transaction and wait for it to be mined.
    async fn submit<F>(
        &self,
        kind: TxKind,
        amount: Option<&str>,
        deposit_id: Option<u64>,
        send: F,
    ) -> Result<TxOutcome>
    where
        F: Future<Output = Result<TxHash>> + Send,
    {
        self.set_phase(TxPhase::Submitting).await;
        let hash = match send.await {
            Ok(hash) => hash,
            Err(err) => {
                self.events.emit(AppEvent::TransactionFailed {
                    hash: None,
                    kind,
                    error: contract_error_message(&err),
                });
                return Err(err);
            }
        };

        self.journal_pending(&hash, kind, amount, deposit_id).await;
        self.events.emit(AppEvent::TransactionPending {
            hash: hash.clone(),
            kind,
        });
        self.set_phase(TxPhase::AwaitingConfirmation).await;

        match self.contracts.wait_for_receipt(&hash).await {
            Ok(receipt) => {
                self.journal_status(&hash, TxRecordStatus::Confirmed, receipt.block_number).await;
                self.events.emit(AppEvent::TransactionConfirmed {
                    hash: hash.clone(),
                    kind,
                    block_number: receipt.block_number,
                });
                Ok(TxOutcome {
                    hash,
                    block_number: receipt.block_number,
                })
            }
            Err(err) => {
                self.journal_status(&hash, TxRecordStatus::Failed, None).await;
                self.events.emit(AppEvent::TransactionFailed {
                    hash: Some(hash),
                    kind,
                    error: contract_error_message(&err),
                });
                Err(err)
            }
        }
    }

    /// Lock `amount` (decimal token units) for `duration` seconds through the
    /// router, approving the router first when the allowance is short.
    ///
    /// Performs no validation of its own; the caller gates input.
    pub async fn deposit(&self, amount: &str, duration: u64) -> Result<TxOutcome> {
        let owner = self.require_account().await?;
        self.begin().await;
        let result = self.deposit_steps(&owner, amount, duration).await;
        self.finish(TxKind::Deposit, result, "Deposit successful!").await
    }

    async fn deposit_steps(
        &self,
        owner: &WalletAddress,
        amount: &str,
        duration: u64,
    ) -> Result<TxOutcome> {
        let amount_wei = to_base_units(amount, USDC_DECIMALS)?;
        let router = self.contracts.addresses().vault_router.clone();

        let allowance = self
            .contracts
            .token_allowance(owner, &router)
            .await
            .context("read router allowance")?;

        if allowance < amount_wei {
            self.set_status("Approving USDC...").await;
            self.submit(
                TxKind::Approve,
                Some(amount),
                None,
                self.contracts.approve(owner, &router, amount_wei),
            )
            .await?;
            self.set_status("Approved! Now depositing...").await;
        }

        self.set_status("Depositing...").await;
        let outcome = self
            .submit(
                TxKind::Deposit,
                Some(amount),
                None,
                self.contracts.router_deposit(owner, amount_wei, duration),
            )
            .await?;

        self.events.emit(AppEvent::DepositCreated {
            amount: amount_wei,
            duration,
        });
        Ok(outcome)
    }

    /// Withdraw an unlocked deposit. Lock state is the vault's to enforce.
    pub async fn withdraw(&self, deposit_id: u64) -> Result<TxOutcome> {
        let owner = self.require_account().await?;
        self.begin().await;
        self.set_status("Withdrawing...").await;

        let result = self
            .submit(
                TxKind::Withdraw,
                None,
                Some(deposit_id),
                self.contracts.vault_withdraw(&owner, deposit_id),
            )
            .await;
        if result.is_ok() {
            self.events.emit(AppEvent::DepositWithdrawn {
                deposit_id,
                emergency: false,
            });
        }
        self.finish(TxKind::Withdraw, result, "Withdrawal successful!").await
    }

    /// Withdraw before unlock, forfeiting the penalty.
    pub async fn emergency_withdraw(&self, deposit_id: u64) -> Result<TxOutcome> {
        let owner = self.require_account().await?;
        self.begin().await;
        self.set_status("Emergency withdrawing (10% penalty)...").await;

        let result = self
            .submit(
                TxKind::EmergencyWithdraw,
                None,
                Some(deposit_id),
                self.contracts.vault_emergency_withdraw(&owner, deposit_id),
            )
            .await;
        if result.is_ok() {
            self.events.emit(AppEvent::DepositWithdrawn {
                deposit_id,
                emergency: true,
            });
        }
        self.finish(TxKind::EmergencyWithdraw, result, "Emergency withdrawal successful!")
            .await
    }
}
