use tokio::sync::broadcast;
use tv_api_types::{ChainId, TxHash, TxKind, WalletAddress};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    WalletConnected { address: WalletAddress, chain_id: ChainId },
    WalletDisconnected,
    AccountChanged { address: WalletAddress },
    NetworkChanged { chain_id: ChainId },
    TransactionPending { hash: TxHash, kind: TxKind },
    TransactionConfirmed { hash: TxHash, kind: TxKind, block_number: Option<u64> },
    TransactionFailed { hash: Option<TxHash>, kind: TxKind, error: String },
    DepositCreated { amount: u128, duration: u64 },
    DepositWithdrawn { deposit_id: u64, emergency: bool },
}

impl AppEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AppEvent::WalletConnected { .. } => "wallet:connected",
            AppEvent::WalletDisconnected => "wallet:disconnected",
            AppEvent::AccountChanged { .. } => "wallet:account_changed",
            AppEvent::NetworkChanged { .. } => "network:changed",
            AppEvent::TransactionPending { .. } => "tx:pending",
            AppEvent::TransactionConfirmed { .. } => "tx:confirmed",
            AppEvent::TransactionFailed { .. } => "tx:failed",
            AppEvent::DepositCreated { .. } => "deposit:created",
            AppEvent::DepositWithdrawn { .. } => "deposit:withdrawn",
        }
    }
}

pub struct EventSubscription {
    rx: broadcast::Receiver<AppEvent>,
}

impl EventSubscription {
    pub async fn next(&mut self) -> Option<AppEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("event listener lagged, {skipped} events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking; `None` when nothing is queued.
    pub fn try_next(&mut self) -> Option<AppEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// Application-wide publish/subscribe channel. Construct one per app and hand
/// clones to each component.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Delivers to every current listener and returns how many there were.
    pub fn emit(&self, event: AppEvent) -> usize {
        tracing::debug!("event {}", event.name());
        self.tx.send(event).unwrap_or(0)
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
