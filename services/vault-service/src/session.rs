use axum::{Json, extract::State};
use std::sync::Arc;
use tracing::warn;
use tv_api_types::SessionResponse;
use tv_format::{address_explorer_url, checksum_address, shorten_address};
use tv_wallet_core::{ErrorKind, classify, contract_error_message};

use crate::{ApiResult, AppState, unavailable, upstream_error};

pub(crate) async fn session_response(state: &AppState) -> SessionResponse {
    let session = state.connector.session().await;
    let target = state.connector.target();
    let address = session.address.as_ref().map(|address| checksum_address(&address.0));

    SessionResponse {
        address_short: address.as_deref().map(|address| shorten_address(address, 4)),
        explorer_url: address
            .as_deref()
            .map(|address| address_explorer_url(target.block_explorer, address)),
        address,
        chain_id: session.chain_id.map(|chain_id| chain_id.0),
        is_connecting: session.is_connecting,
        is_connected: session.address.is_some(),
        is_correct_chain: session.chain_id == Some(target.chain_id),
        target_chain_id: target.chain_id.0,
        target_chain_name: target.name.to_owned(),
        last_error: session.last_error,
    }
}

/// Rejections are not failures: the caller gets the session back with
/// `last_error` set.
async fn wallet_failure(
    state: &AppState,
    title: &str,
    err: anyhow::Error,
) -> ApiResult<SessionResponse> {
    match classify(&err) {
        ErrorKind::UserRejected => Ok(Json(session_response(state).await)),
        ErrorKind::ProviderUnavailable => Err(unavailable(err.to_string())),
        _ => {
            warn!("{title}: {err:#}");
            state.toasts.report_failure(title, &err).await;
            Err(upstream_error(contract_error_message(&err)))
        }
    }
}

pub(crate) async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    Json(session_response(&state).await)
}

pub(crate) async fn connect(State(state): State<Arc<AppState>>) -> ApiResult<SessionResponse> {
    match state.connector.connect().await {
        Ok(session) => {
            state.vault.bind(session.address).await;
            if !state.connector.is_correct_chain().await {
                let target = state.connector.target().name;
                state
                    .toasts
                    .warning("Wrong network", Some(format!("Switch to {target} to continue")))
                    .await;
            }
            Ok(Json(session_response(&state).await))
        }
        Err(err) => wallet_failure(&state, "Connection failed", err).await,
    }
}

pub(crate) async fn disconnect(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    state.connector.disconnect().await;
    state.vault.bind(None).await;
    Json(session_response(&state).await)
}

pub(crate) async fn switch_network(
    State(state): State<Arc<AppState>>,
) -> ApiResult<SessionResponse> {
    match state.connector.switch_to_target().await {
        Ok(()) => Ok(Json(session_response(&state).await)),
        Err(err) => wallet_failure(&state, "Network switch failed", err).await,
    }
}
