pub mod abi;
pub mod http;
pub mod retry;

use alloy_primitives::{Address, U256, hex};
use alloy_sol_types::SolCall;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tv_api_types::{DepositRecord, TxHash, WalletAddress};
use tv_chain_client::{ContractAddresses, TxReceipt, TxReverted, VaultContracts, WalletProvider};

use abi::{IERC20, ITimelockVault, IVaultRouter};
pub use http::HttpProvider;
use retry::{RetryPolicy, is_transient, retry_read};

/// [`VaultContracts`] over a wallet provider: reads are `eth_call`, writes
/// are `eth_sendTransaction` signed by the wallet.
pub struct EvmContracts {
    provider: Arc<dyn WalletProvider>,
    addresses: ContractAddresses,
    receipt_poll_interval: Duration,
    retry: RetryPolicy,
}

impl EvmContracts {
    pub fn new(provider: Arc<dyn WalletProvider>, addresses: ContractAddresses) -> Self {
        Self {
            provider,
            addresses,
            receipt_poll_interval: Duration::from_secs(2),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_receipt_poll_interval(mut self, interval: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn call<C: SolCall>(&self, to: &WalletAddress, call: C) -> Result<C::Return> {
        let data = hex::encode_prefixed(call.abi_encode());
        let params = json!([{ "to": to.0, "data": data }, "latest"]);
        let provider = Arc::clone(&self.provider);

        let raw = retry_read(&self.retry, "eth_call", move || {
            let provider = Arc::clone(&provider);
            let params = params.clone();
            async move { provider.request("eth_call", params).await }
        })
        .await
        .with_context(|| format!("eth_call {}", C::SIGNATURE))?;

        let data = raw
            .as_str()
            .ok_or_else(|| anyhow!("eth_call {} returned {raw}", C::SIGNATURE))?;
        let bytes = hex::decode(data).with_context(|| format!("eth_call {} hex", C::SIGNATURE))?;

        C::abi_decode_returns(&bytes, true).with_context(|| format!("decode {}", C::SIGNATURE))
    }

    async fn send<C: SolCall>(
        &self,
        from: &WalletAddress,
        to: &WalletAddress,
        call: C,
    ) -> Result<TxHash> {
        let params = json!([{
            "from": from.0,
            "to": to.0,
            "data": hex::encode_prefixed(call.abi_encode()),
        }]);

        let raw = self
            .provider
            .request("eth_sendTransaction", params)
            .await
            .with_context(|| format!("eth_sendTransaction {}", C::SIGNATURE))?;

        let hash = raw
            .as_str()
            .ok_or_else(|| anyhow!("eth_sendTransaction {} returned {raw}", C::SIGNATURE))?;

        info!("submitted {} from {from}: {hash}", C::SIGNATURE);
        Ok(TxHash(hash.to_owned()))
    }
}

fn parse_address(address: &WalletAddress) -> Result<Address> {
    Address::from_str(&address.0).with_context(|| format!("invalid address {address}"))
}

fn u256_to_u128(value: U256) -> Result<u128> {
    let limbs = value.as_limbs();
    if limbs[2] != 0 || limbs[3] != 0 {
        anyhow::bail!("value {value} does not fit in 128 bits");
    }
    Ok(u128::from(limbs[0]) | (u128::from(limbs[1]) << 64))
}

fn u256_to_u64(value: U256) -> Result<u64> {
    let limbs = value.as_limbs();
    if limbs[1..].iter().any(|limb| *limb != 0) {
        anyhow::bail!("value {value} does not fit in 64 bits");
    }
    Ok(limbs[0])
}

fn parse_quantity(value: &Value) -> Option<u64> {
    let raw = value.as_str()?;
    u64::from_str_radix(raw.strip_prefix("0x")?, 16).ok()
}

#[async_trait]
impl VaultContracts for EvmContracts {
    fn addresses(&self) -> &ContractAddresses {
        &self.addresses
    }

    async fn token_balance(&self, owner: &WalletAddress) -> Result<u128> {
        let call = IERC20::balanceOfCall {
            account: parse_address(owner)?,
        };
        let balance = self.call(&self.addresses.usdc, call).await?;
        u256_to_u128(balance._0)
    }

    async fn token_allowance(
        &self,
        owner: &WalletAddress,
        spender: &WalletAddress,
    ) -> Result<u128> {
        let call = IERC20::allowanceCall {
            owner: parse_address(owner)?,
            spender: parse_address(spender)?,
        };
        let allowance = self.call(&self.addresses.usdc, call).await?;
        u256_to_u128(allowance._0)
    }

    async fn approve(
        &self,
        from: &WalletAddress,
        spender: &WalletAddress,
        amount: u128,
    ) -> Result<TxHash> {
        let call = IERC20::approveCall {
            spender: parse_address(spender)?,
            amount: U256::from(amount),
        };
        self.send(from, &self.addresses.usdc, call).await
    }

    async fn next_deposit_id(&self) -> Result<u64> {
        let next = self
            .call(&self.addresses.timelock_vault, ITimelockVault::nextDepositIdCall {})
            .await?;
        u256_to_u64(next._0)
    }

    async fn deposit_record(&self, deposit_id: u64) -> Result<DepositRecord> {
        let call = ITimelockVault::depositsCall {
            depositId: U256::from(deposit_id),
        };
        let slot = self.call(&self.addresses.timelock_vault, call).await?;

        if slot.owner == Address::ZERO {
            anyhow::bail!("deposit {deposit_id} does not exist");
        }

        Ok(DepositRecord {
            id: deposit_id,
            owner: WalletAddress(slot.owner.to_checksum(None)),
            principal: u256_to_u128(slot.principal)?,
            start_time: slot.startTime,
            unlock_time: slot.unlockTime,
            withdrawn: slot.withdrawn,
        })
    }

    async fn vault_withdraw(&self, from: &WalletAddress, deposit_id: u64) -> Result<TxHash> {
        let call = ITimelockVault::withdrawCall {
            depositId: U256::from(deposit_id),
        };
        self.send(from, &self.addresses.timelock_vault, call).await
    }

    async fn vault_emergency_withdraw(
        &self,
        from: &WalletAddress,
        deposit_id: u64,
    ) -> Result<TxHash> {
        let call = ITimelockVault::emergencyWithdrawCall {
            depositId: U256::from(deposit_id),
        };
        self.send(from, &self.addresses.timelock_vault, call).await
    }

    async fn router_deposit(
        &self,
        from: &WalletAddress,
        gross_amount: u128,
        duration: u64,
    ) -> Result<TxHash> {
        let call = IVaultRouter::depositCall {
            grossAmount: U256::from(gross_amount),
            duration,
        };
        self.send(from, &self.addresses.vault_router, call).await
    }

    async fn wait_for_receipt(&self, hash: &TxHash) -> Result<TxReceipt> {
        loop {
            match self
                .provider
                .request("eth_getTransactionReceipt", json!([hash.0]))
                .await
            {
                Ok(Value::Null) => debug!("receipt for {hash} not yet available"),
                Ok(receipt) => {
                    let block_number = receipt.get("blockNumber").and_then(parse_quantity);
                    if receipt.get("status").and_then(Value::as_str) == Some("0x0") {
                        return Err(TxReverted {
                            hash: hash.clone(),
                            block_number,
                        }
                        .into());
                    }
                    info!("transaction {hash} confirmed in block {block_number:?}");
                    return Ok(TxReceipt {
                        hash: hash.clone(),
                        block_number,
                    });
                }
                Err(err) if is_transient(&err) => warn!("receipt poll for {hash} failed: {err}"),
                Err(err) => {
                    return Err(anyhow::Error::new(err).context(format!("receipt for {hash}")));
                }
            }
            tokio::time::sleep(self.receipt_poll_interval).await;
        }
    }
}
