//! Background task that turns application events into synchronizer work and
//! transaction toasts.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tv_wallet_core::AppEvent;

use crate::AppState;

pub(crate) fn spawn(state: Arc<AppState>) -> JoinHandle<()> {
    let mut events = state.events.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            handle(&state, event).await;
        }
        debug!("event relay stopped");
    })
}

async fn handle(state: &AppState, event: AppEvent) {
    match event {
        AppEvent::AccountChanged { address } => {
            info!("account changed to {address}, resynchronizing");
            state.vault.bind(Some(address)).await;
        }
        AppEvent::WalletDisconnected => state.vault.bind(None).await,
        AppEvent::NetworkChanged { chain_id } => {
            info!("network changed to {}", chain_id.0);
            state.vault.reload().await;
            if !state.connector.is_correct_chain().await {
                let target = state.connector.target().name;
                state
                    .toasts
                    .warning("Wrong network", Some(format!("Switch to {target} to continue")))
                    .await;
            }
        }
        AppEvent::TransactionPending { hash, kind } => {
            state.toasts.pending(format!("{} submitted", kind.label()), hash).await;
        }
        AppEvent::TransactionConfirmed { hash, kind, .. } => {
            state.toasts.confirmed(format!("{} confirmed", kind.label()), hash).await;
        }
        other => debug!("relay ignoring {}", other.name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use serde_json::Value;
    use std::time::Duration;
    use tv_api_types::{ChainId, TxHash, TxKind, WalletAddress};
    use tv_chain_client::ProviderEvent;

    async fn eventually<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn transaction_events_become_toasts() {
        let harness = Harness::new(ChainId(8453));
        let task = spawn(harness.state.clone());

        let hash = TxHash("0xfeed".to_owned());
        harness.state.events.emit(AppEvent::TransactionPending {
            hash: hash.clone(),
            kind: TxKind::Deposit,
        });
        harness.state.events.emit(AppEvent::TransactionConfirmed {
            hash,
            kind: TxKind::Deposit,
            block_number: Some(7),
        });

        let state = harness.state.clone();
        eventually(|| {
            let state = state.clone();
            async move { state.toasts.active().await.len() == 2 }
        })
        .await;

        let (_, body) = harness.call("GET", "/toasts", None).await;
        assert_eq!(body[0]["type"], "pending");
        assert_eq!(body[0]["title"], "Deposit submitted");
        assert_eq!(body[1]["type"], "success");
        assert_eq!(body[1]["title"], "Deposit confirmed");
        assert_eq!(body[1]["tx_hash"], "0xfeed");
        task.abort();
    }

    #[tokio::test]
    async fn provider_account_switch_rebinds_vault() {
        let harness = Harness::connected(ChainId(8453)).await;
        let listener = harness.state.connector.spawn_listener();
        let task = spawn(harness.state.clone());

        let bob = "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359";
        harness
            .provider
            .emit(ProviderEvent::AccountsChanged(vec![WalletAddress(bob.to_owned())]));

        let vault = harness.state.vault.clone();
        eventually(|| {
            let vault = vault.clone();
            async move { vault.account().await == Some(WalletAddress(bob.to_owned())) }
        })
        .await;

        harness.provider.emit(ProviderEvent::AccountsChanged(Vec::new()));
        eventually(|| {
            let vault = vault.clone();
            async move { vault.account().await.is_none() }
        })
        .await;

        let (_, session) = harness.call("GET", "/session", None).await;
        assert_eq!(session["address"], Value::Null);

        task.abort();
        if let Some(listener) = listener {
            listener.abort();
        }
    }

    #[tokio::test]
    async fn chain_change_to_wrong_network_warns() {
        let harness = Harness::connected(ChainId(8453)).await;
        let listener = harness.state.connector.spawn_listener();
        let task = spawn(harness.state.clone());

        harness
            .provider
            .emit(ProviderEvent::ChainChanged(ChainId(1)));

        let state = harness.state.clone();
        eventually(|| {
            let state = state.clone();
            async move {
                state
                    .toasts
                    .active()
                    .await
                    .iter()
                    .any(|toast| toast.title == "Wrong network")
            }
        })
        .await;

        let (_, session) = harness.call("GET", "/session", None).await;
        assert_eq!(session["chain_id"], 1);
        assert_eq!(session["is_correct_chain"], false);

        task.abort();
        if let Some(listener) = listener {
            listener.abort();
        }
    }
}
