use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tv_api_types::{ChainId, WalletAddress};
use tv_chain_client::{
    NetworkConfig, ProviderEvent, WalletProvider, parse_accounts, parse_chain_id,
};
use tv_format::is_valid_address;

use crate::error::ConnectError;
use crate::events::{AppEvent, EventBus};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletSession {
    pub address: Option<WalletAddress>,
    pub chain_id: Option<ChainId>,
    pub is_connecting: bool,
    pub last_error: Option<String>,
}

/// Owns the wallet session. Nothing else mutates it.
pub struct WalletConnector {
    provider: Option<Arc<dyn WalletProvider>>,
    target: NetworkConfig,
    session: RwLock<WalletSession>,
    events: EventBus,
}

impl WalletConnector {
    pub fn new(
        provider: Option<Arc<dyn WalletProvider>>,
        target: NetworkConfig,
        events: EventBus,
    ) -> Self {
        Self {
            provider,
            target,
            session: RwLock::new(WalletSession::default()),
            events,
        }
    }

    pub fn target(&self) -> &NetworkConfig {
        &self.target
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn session(&self) -> WalletSession {
        self.session.read().await.clone()
    }

    pub async fn address(&self) -> Option<WalletAddress> {
        self.session.read().await.address.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.session.read().await.address.is_some()
    }

    pub async fn is_correct_chain(&self) -> bool {
        self.session.read().await.chain_id == Some(self.target.chain_id)
    }

    async fn record_error(&self, message: String) {
        let mut session = self.session.write().await;
        session.is_connecting = false;
        session.last_error = Some(message);
    }

    async fn require_provider(&self) -> Result<Arc<dyn WalletProvider>> {
        match &self.provider {
            Some(provider) => Ok(Arc::clone(provider)),
            None => {
                self.record_error(ConnectError::ProviderUnavailable.to_string()).await;
                Err(ConnectError::ProviderUnavailable.into())
            }
        }
    }

    pub async fn connect(&self) -> Result<WalletSession> {
        let provider = self.require_provider().await?;

        {
            let mut session = self.session.write().await;
            session.is_connecting = true;
            session.last_error = None;
        }

        match request_session(provider.as_ref()).await {
            Ok((address, chain_id)) => {
                let snapshot = {
                    let mut session = self.session.write().await;
                    session.address = Some(address.clone());
                    session.chain_id = Some(chain_id);
                    session.is_connecting = false;
                    session.clone()
                };
                info!("wallet connected: {address} on chain {}", chain_id.0);
                self.events.emit(AppEvent::WalletConnected { address, chain_id });
                Ok(snapshot)
            }
            Err(err) => {
                warn!("wallet connect failed: {err:#}");
                self.record_error(err.root_cause().to_string()).await;
                Err(err)
            }
        }
    }

    /// Ask the wallet to move to the target network, registering it first if
    /// the wallet does not know it.
    pub async fn switch_to_target(&self) -> Result<()> {
        let provider = self.require_provider().await?;
        let chain_hex = self.target.chain_id.to_hex();

        match provider
            .request("wallet_switchEthereumChain", json!([{ "chainId": chain_hex }]))
            .await
        {
            Ok(_) => {}
            Err(err) if err.is_unrecognized_chain() => {
                info!("{} unknown to wallet, adding it", self.target.name);
                let params = json!([{
                    "chainId": chain_hex,
                    "chainName": self.target.name,
                    "nativeCurrency": {
                        "name": self.target.native_currency.name,
                        "symbol": self.target.native_currency.symbol,
                        "decimals": self.target.native_currency.decimals,
                    },
                    "rpcUrls": [self.target.rpc_url],
                    "blockExplorerUrls": [self.target.block_explorer],
                }]);
                if let Err(add_err) = provider.request("wallet_addEthereumChain", params).await {
                    let message = format!("Failed to add {} network", self.target.name);
                    warn!("{message}: {add_err}");
                    self.record_error(message.clone()).await;
                    return Err(anyhow::Error::new(add_err).context(message));
                }
            }
            Err(err) => {
                warn!("network switch failed: {err}");
                self.record_error(err.to_string()).await;
                return Err(anyhow::Error::new(err).context("wallet_switchEthereumChain"));
            }
        }

        match provider.request("eth_chainId", json!([])).await {
            Ok(value) => match parse_chain_id(&value) {
                Ok(chain_id) => self.apply_chain(chain_id).await,
                Err(err) => debug!("chain id after switch unreadable: {err}"),
            },
            Err(err) => debug!("chain id after switch unavailable: {err}"),
        }
        Ok(())
    }

    /// Local only; the wallet keeps its own authorization.
    pub async fn disconnect(&self) {
        *self.session.write().await = WalletSession::default();
        info!("wallet disconnected");
        self.events.emit(AppEvent::WalletDisconnected);
    }

    async fn apply_chain(&self, chain_id: ChainId) {
        let changed = {
            let mut session = self.session.write().await;
            if session.address.is_none() || session.chain_id == Some(chain_id) {
                false
            } else {
                session.chain_id = Some(chain_id);
                true
            }
        };
        if changed {
            info!("wallet network changed to {}", chain_id.0);
            self.events.emit(AppEvent::NetworkChanged { chain_id });
        }
    }

    pub async fn handle_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) => {
                let Some(address) = accounts.into_iter().next() else {
                    if self.is_connected().await {
                        self.disconnect().await;
                    }
                    return;
                };

                let changed = {
                    let mut session = self.session.write().await;
                    match &session.address {
                        Some(current) if !current.matches(&address) => {
                            session.address = Some(address.clone());
                            true
                        }
                        _ => false,
                    }
                };
                if changed {
                    info!("wallet account changed to {address}");
                    self.events.emit(AppEvent::AccountChanged { address });
                }
            }
            ProviderEvent::ChainChanged(chain_id) => self.apply_chain(chain_id).await,
        }
    }

    /// Forward provider events into the session until the provider goes away.
    /// Abort the handle to unsubscribe.
    pub fn spawn_listener(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let provider = self.provider.as_ref()?;
        let mut subscription = provider.subscribe();
        let connector = Arc::clone(self);

        Some(tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                connector.handle_event(event).await;
            }
            debug!("provider event stream closed");
        }))
    }
}

async fn request_session(provider: &dyn WalletProvider) -> Result<(WalletAddress, ChainId)> {
    let accounts = match provider.request("eth_requestAccounts", json!([])).await {
        Err(err) if err.is_method_not_found() => {
            debug!("eth_requestAccounts unsupported, falling back to eth_accounts");
            provider
                .request("eth_accounts", json!([]))
                .await
                .context("eth_accounts")?
        }
        other => other.context("eth_requestAccounts")?,
    };

    let address = parse_accounts(&accounts)?
        .into_iter()
        .next()
        .ok_or(ConnectError::NoAccounts)?;
    if !is_valid_address(&address.0) {
        return Err(ConnectError::InvalidAccount(address.0).into());
    }

    let chain = provider.request("eth_chainId", json!([])).await.context("eth_chainId")?;
    Ok((address, parse_chain_id(&chain)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProvider;
    use tv_chain_client::{BASE_MAINNET, ProviderError};

    const ALICE: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
    const BOB: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";

    fn connector(provider: Option<Arc<MockProvider>>) -> (Arc<WalletConnector>, EventBus) {
        let events = EventBus::default();
        let provider = provider.map(|provider| provider as Arc<dyn WalletProvider>);
        (Arc::new(WalletConnector::new(provider, BASE_MAINNET, events.clone())), events)
    }

    #[tokio::test]
    async fn connect_without_provider_fails() {
        let (connector, _) = connector(None);
        let err = connector.connect().await.unwrap_err();
        assert_eq!(err.downcast_ref::<ConnectError>(), Some(&ConnectError::ProviderUnavailable));

        let session = connector.session().await;
        assert!(!session.is_connecting);
        assert_eq!(session.last_error.as_deref(), Some("No wallet provider available"));
    }

    #[tokio::test]
    async fn connect_with_empty_account_list_fails() {
        let provider = MockProvider::new();
        provider.respond_always("eth_requestAccounts", Ok(json!([])));
        let (connector, _) = connector(Some(provider));

        let err = connector.connect().await.unwrap_err();
        assert_eq!(err.downcast_ref::<ConnectError>(), Some(&ConnectError::NoAccounts));
        assert!(!connector.is_connected().await);
        assert_eq!(connector.session().await.last_error.as_deref(), Some("No accounts found"));
    }

    #[tokio::test]
    async fn connect_rejects_malformed_account() {
        let provider = MockProvider::new();
        provider.respond_always("eth_requestAccounts", Ok(json!(["0x1234"])));
        let (connector, _) = connector(Some(provider));

        let err = connector.connect().await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConnectError>(),
            Some(&ConnectError::InvalidAccount("0x1234".into()))
        );
        assert!(!connector.is_connected().await);
    }

    #[tokio::test]
    async fn connect_stores_session_and_publishes() {
        let (connector, events) = connector(Some(MockProvider::wallet(ALICE, ChainId(8453))));
        let mut sub = events.subscribe();

        let session = connector.connect().await.unwrap();
        assert_eq!(session.address, Some(WalletAddress(ALICE.into())));
        assert!(connector.is_correct_chain().await);
        assert_eq!(
            sub.try_next(),
            Some(AppEvent::WalletConnected {
                address: WalletAddress(ALICE.into()),
                chain_id: ChainId(8453),
            })
        );
    }

    #[tokio::test]
    async fn connect_falls_back_to_eth_accounts() {
        let provider = MockProvider::new();
        provider.respond_always("eth_accounts", Ok(json!([ALICE])));
        provider.respond_always("eth_chainId", Ok(json!("0x1")));
        let (connector, _) = connector(Some(provider.clone()));

        connector.connect().await.unwrap();
        assert_eq!(provider.methods(), vec!["eth_requestAccounts", "eth_accounts", "eth_chainId"]);
        assert!(!connector.is_correct_chain().await);
    }

    #[tokio::test]
    async fn rejected_connect_records_message() {
        let provider = MockProvider::new();
        provider.respond_always(
            "eth_requestAccounts",
            Err(ProviderError::rpc(4001, "User rejected the request.")),
        );
        let (connector, _) = connector(Some(provider));

        assert!(connector.connect().await.is_err());
        assert_eq!(
            connector.session().await.last_error.as_deref(),
            Some("User rejected the request. (code 4001)")
        );
    }

    #[tokio::test]
    async fn switch_adds_unknown_chain() {
        let provider = MockProvider::wallet(ALICE, ChainId(1));
        provider.respond(
            "wallet_switchEthereumChain",
            Err(ProviderError::rpc(4902, "Unrecognized chain ID \"0x2105\".")),
        );
        provider.respond("wallet_addEthereumChain", Ok(serde_json::Value::Null));
        let (connector, events) = connector(Some(provider.clone()));
        connector.connect().await.unwrap();

        let mut sub = events.subscribe();
        provider.respond("eth_chainId", Ok(json!("0x2105")));
        connector.switch_to_target().await.unwrap();

        let calls = provider.calls();
        let add = calls.iter().find(|(method, _)| method == "wallet_addEthereumChain").unwrap();
        assert_eq!(add.1[0]["chainId"], "0x2105");
        assert_eq!(add.1[0]["chainName"], "Base");
        assert_eq!(add.1[0]["rpcUrls"][0], "https://mainnet.base.org");
        assert_eq!(add.1[0]["nativeCurrency"]["decimals"], 18);

        assert!(connector.is_correct_chain().await);
        assert_eq!(sub.try_next(), Some(AppEvent::NetworkChanged { chain_id: ChainId(8453) }));
    }

    #[tokio::test]
    async fn rejected_add_chain_sets_last_error() {
        let provider = MockProvider::wallet(ALICE, ChainId(1));
        provider.respond(
            "wallet_switchEthereumChain",
            Err(ProviderError::rpc(4902, "Unrecognized chain ID")),
        );
        provider.respond(
            "wallet_addEthereumChain",
            Err(ProviderError::rpc(4001, "User rejected the request.")),
        );
        let (connector, _) = connector(Some(provider));
        connector.connect().await.unwrap();

        let err = connector.switch_to_target().await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to add Base network");
        assert_eq!(
            connector.session().await.last_error.as_deref(),
            Some("Failed to add Base network")
        );
        assert!(!connector.is_correct_chain().await);
    }

    #[tokio::test]
    async fn provider_events_drive_the_session() {
        let provider = MockProvider::wallet(ALICE, ChainId(8453));
        let (connector, events) = connector(Some(provider));
        connector.connect().await.unwrap();
        let mut sub = events.subscribe();

        connector
            .handle_event(ProviderEvent::AccountsChanged(vec![WalletAddress(BOB.into())]))
            .await;
        assert_eq!(connector.address().await, Some(WalletAddress(BOB.into())));
        assert_eq!(
            sub.try_next(),
            Some(AppEvent::AccountChanged {
                address: WalletAddress(BOB.into()),
            })
        );

        connector
            .handle_event(ProviderEvent::AccountsChanged(vec![WalletAddress(BOB.to_lowercase())]))
            .await;
        assert_eq!(sub.try_next(), None);

        connector.handle_event(ProviderEvent::ChainChanged(ChainId(1))).await;
        assert!(!connector.is_correct_chain().await);
        assert_eq!(sub.try_next(), Some(AppEvent::NetworkChanged { chain_id: ChainId(1) }));

        connector.handle_event(ProviderEvent::AccountsChanged(Vec::new())).await;
        assert!(!connector.is_connected().await);
        assert_eq!(connector.session().await, WalletSession::default());
        assert_eq!(sub.try_next(), Some(AppEvent::WalletDisconnected));
    }

    #[tokio::test]
    async fn listener_forwards_pushed_events() {
        let provider = MockProvider::wallet(ALICE, ChainId(8453));
        let (connector, events) = connector(Some(provider.clone()));
        connector.connect().await.unwrap();
        let mut sub = events.subscribe();

        let handle = connector.spawn_listener().unwrap();
        provider.emit(ProviderEvent::ChainChanged(ChainId(84532)));

        assert_eq!(sub.next().await, Some(AppEvent::NetworkChanged { chain_id: ChainId(84532) }));
        handle.abort();
    }
}
