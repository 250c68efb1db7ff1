pub mod error;
pub mod network;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tv_api_types::{ChainId, DepositRecord, TxHash, WalletAddress};

pub use error::{ProviderError, TxReverted};
pub use network::{BASE_MAINNET, BASE_SEPOLIA, ContractAddresses, NetworkConfig};

/// Events a wallet provider pushes without being asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<WalletAddress>),
    ChainChanged(ChainId),
}

/// Live subscription to provider events. Dropping it unsubscribes.
pub struct ProviderSubscription {
    rx: broadcast::Receiver<ProviderEvent>,
}

impl ProviderSubscription {
    /// Next event, or `None` once the provider is gone. Events missed by a
    /// slow reader are skipped; every event carries full state.
    pub async fn next(&mut self) -> Option<ProviderEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Fan-out of provider events to any number of subscribers.
#[derive(Clone)]
pub struct ProviderEvents {
    tx: broadcast::Sender<ProviderEvent>,
}

impl Default for ProviderEvents {
    fn default() -> Self {
        Self::new(32)
    }
}

impl ProviderEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> ProviderSubscription {
        ProviderSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Returns the number of subscribers that received the event.
    pub fn emit(&self, event: ProviderEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Minimal request/event surface of an EIP-1193 style wallet provider.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;
    fn subscribe(&self) -> ProviderSubscription;
}

/// Chain ids arrive as hex quantities (`"0x2105"`); some providers send
/// plain numbers.
pub fn parse_chain_id(value: &Value) -> Result<ChainId, ProviderError> {
    match value {
        Value::String(raw) => ChainId::from_hex(raw)
            .ok_or_else(|| ProviderError::Decode(format!("invalid chain id: {raw}"))),
        Value::Number(number) => number
            .as_u64()
            .map(ChainId)
            .ok_or_else(|| ProviderError::Decode(format!("invalid chain id: {number}"))),
        other => Err(ProviderError::Decode(format!("invalid chain id: {other}"))),
    }
}

pub fn parse_accounts(value: &Value) -> Result<Vec<WalletAddress>, ProviderError> {
    let Value::Array(items) = value else {
        return Err(ProviderError::Decode(format!("expected account list, got {value}")));
    };

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|raw| WalletAddress(raw.to_owned()))
                .ok_or_else(|| ProviderError::Decode(format!("invalid account: {item}")))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub hash: TxHash,
    pub block_number: Option<u64>,
}

/// Typed calls on the token, vault and router contracts.
///
/// Writes return as soon as the provider accepts the transaction;
/// `wait_for_receipt` resolves once it is mined and fails with
/// [`TxReverted`] when execution failed.
#[async_trait]
pub trait VaultContracts: Send + Sync {
    fn addresses(&self) -> &ContractAddresses;

    async fn token_balance(&self, owner: &WalletAddress) -> Result<u128>;
    async fn token_allowance(
        &self,
        owner: &WalletAddress,
        spender: &WalletAddress,
    ) -> Result<u128>;
    async fn approve(
        &self,
        from: &WalletAddress,
        spender: &WalletAddress,
        amount: u128,
    ) -> Result<TxHash>;

    async fn next_deposit_id(&self) -> Result<u64>;
    async fn deposit_record(&self, deposit_id: u64) -> Result<DepositRecord>;
    async fn vault_withdraw(&self, from: &WalletAddress, deposit_id: u64) -> Result<TxHash>;
    async fn vault_emergency_withdraw(
        &self,
        from: &WalletAddress,
        deposit_id: u64,
    ) -> Result<TxHash>;

    async fn router_deposit(
        &self,
        from: &WalletAddress,
        gross_amount: u128,
        duration: u64,
    ) -> Result<TxHash>;

    async fn wait_for_receipt(&self, hash: &TxHash) -> Result<TxReceipt>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscription_receives_events_until_dropped() {
        let events = ProviderEvents::default();
        let mut sub = events.subscribe();
        assert_eq!(events.subscriber_count(), 1);

        events.emit(ProviderEvent::ChainChanged(ChainId(1)));
        assert_eq!(sub.next().await, Some(ProviderEvent::ChainChanged(ChainId(1))));

        drop(sub);
        assert_eq!(events.subscriber_count(), 0);
        assert_eq!(events.emit(ProviderEvent::AccountsChanged(Vec::new())), 0);
    }

    #[tokio::test]
    async fn subscription_ends_when_provider_is_gone() {
        let events = ProviderEvents::default();
        let mut sub = events.subscribe();
        drop(events);
        assert_eq!(sub.next().await, None);
    }

    #[test]
    fn structured_error_codes() {
        assert!(ProviderError::rpc(4001, "User rejected the request.").is_user_rejection());
        assert!(ProviderError::rpc(4902, "Unrecognized chain ID").is_unrecognized_chain());
        assert!(!ProviderError::Transport("timeout".into()).is_user_rejection());
    }

    #[test]
    fn parses_provider_payloads() {
        assert_eq!(parse_chain_id(&serde_json::json!("0x1")).unwrap(), ChainId(1));
        assert_eq!(parse_chain_id(&serde_json::json!(8453)).unwrap(), ChainId(8453));
        assert!(parse_chain_id(&serde_json::json!("base")).is_err());

        let accounts = parse_accounts(&serde_json::json!(["0xaa", "0xbb"])).unwrap();
        assert_eq!(accounts, vec![WalletAddress("0xaa".into()), WalletAddress("0xbb".into())]);
        assert!(parse_accounts(&serde_json::json!("0xaa")).is_err());
    }

    #[test]
    fn known_networks() {
        assert_eq!(network::network_by_slug("base"), Some(&BASE_MAINNET));
        assert_eq!(network::network_by_chain_id(ChainId(84532)), Some(&BASE_SEPOLIA));
        assert_eq!(BASE_MAINNET.chain_id.to_hex(), "0x2105");
    }
}
