use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tv_api_types::{ChainId, WalletAddress};
use tv_chain_client::{
    ProviderError, ProviderEvent, ProviderEvents, ProviderSubscription, WalletProvider,
    parse_accounts, parse_chain_id,
};

/// JSON-RPC 2.0 over HTTP, standing in for an injected browser wallet.
///
/// Plain HTTP cannot push, so account and chain changes are discovered by
/// [`HttpProvider::spawn_watcher`] and fanned out through the same event
/// stream an injected provider would use.
pub struct HttpProvider {
    endpoint: String,
    http: reqwest::Client,
    next_id: AtomicU64,
    events: ProviderEvents,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl HttpProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            http: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
            events: ProviderEvents::default(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn events(&self) -> &ProviderEvents {
        &self.events
    }

    /// Poll `eth_chainId` and `eth_accounts` every `interval` and emit an
    /// event whenever either differs from the previous observation. The first
    /// observation only seeds the baseline.
    pub fn spawn_watcher(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let provider = Arc::clone(self);
        info!("watching {} for account/chain changes every {:?}", provider.endpoint, interval);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut last_chain: Option<ChainId> = None;
            let mut last_accounts: Option<Vec<WalletAddress>> = None;

            loop {
                ticker.tick().await;

                let chain = provider
                    .request("eth_chainId", json!([]))
                    .await
                    .and_then(|v| parse_chain_id(&v));
                match chain {
                    Ok(chain) => {
                        if last_chain.is_some_and(|previous| previous != chain) {
                            provider.events.emit(ProviderEvent::ChainChanged(chain));
                        }
                        last_chain = Some(chain);
                    }
                    Err(err) => debug!("chain poll failed: {err}"),
                }

                let accounts = provider
                    .request("eth_accounts", json!([]))
                    .await
                    .and_then(|v| parse_accounts(&v));
                match accounts {
                    Ok(accounts) => {
                        if last_accounts.as_ref().is_some_and(|previous| previous != &accounts) {
                            provider.events.emit(ProviderEvent::AccountsChanged(accounts.clone()));
                        }
                        last_accounts = Some(accounts);
                    }
                    Err(err) => debug!("accounts poll failed: {err}"),
                }
            }
        })
    }
}

#[async_trait]
impl WalletProvider for HttpProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let body = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::Transport(format!("{method}: {err}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ProviderError::Transport(format!("{method}: {err}")))?;

        let parsed = serde_json::from_str::<RpcResponse>(&text);
        if !status.is_success() && parsed.is_err() {
            return Err(ProviderError::Transport(format!("{method} HTTP {status}: {text}")));
        }

        let parsed = parsed.map_err(|err| ProviderError::Decode(format!("{method}: {err}")))?;
        if let Some(error) = parsed.error {
            return Err(ProviderError::Rpc {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }

        Ok(parsed.result.unwrap_or(Value::Null))
    }

    fn subscribe(&self) -> ProviderSubscription {
        self.events.subscribe()
    }
}
