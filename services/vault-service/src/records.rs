use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;
use tv_api_types::protocol::LOCK_DURATIONS;
use tv_api_types::{
    HistoryEntry, LockOptionResponse, Preferences, PreferencesPatch, ToastMessage, TxKind,
};
use tv_format::{format_relative_time, sanitize_input, tx_explorer_url};
use tv_storage::history::MAX_TRANSACTIONS;
use tv_wallet_core::unix_now;

use crate::{ApiError, ApiResult, AppState, bad_request, internal_error, not_found};

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryQuery {
    pub(crate) limit: Option<usize>,
    #[serde(rename = "type")]
    pub(crate) kind: Option<String>,
}

pub(crate) async fn history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<HistoryEntry>> {
    let limit = query.limit.unwrap_or(10).clamp(1, MAX_TRANSACTIONS);

    let records = match query.kind.as_deref() {
        Some(raw) => {
            let kind = TxKind::parse(raw)
                .ok_or_else(|| bad_request(format!("unknown transaction type {raw:?}")))?;
            state.history.by_kind(kind).await
        }
        None => state.history.recent(limit).await,
    };

    let explorer = state.connector.target().block_explorer;
    let now = unix_now();
    Ok(Json(
        records
            .into_iter()
            .take(limit)
            .map(|record| HistoryEntry {
                relative_time: format_relative_time(record.timestamp / 1_000, now),
                explorer_url: tx_explorer_url(explorer, &record.hash),
                record,
            })
            .collect(),
    ))
}

pub(crate) async fn toasts(State(state): State<Arc<AppState>>) -> Json<Vec<ToastMessage>> {
    Json(state.toasts.active().await)
}

pub(crate) async fn dismiss_toast(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.toasts.dismiss(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("toast {id} not found")))
    }
}

pub(crate) async fn get_preferences(State(state): State<Arc<AppState>>) -> Json<Preferences> {
    Json(state.storage.preferences().await)
}

pub(crate) async fn update_preferences(
    State(state): State<Arc<AppState>>,
    Json(mut patch): Json<PreferencesPatch>,
) -> ApiResult<Preferences> {
    patch.theme = patch.theme.map(|theme| sanitize_input(&theme));
    match state.storage.update_preferences(patch).await {
        Ok(preferences) => Ok(Json(preferences)),
        Err(err) => {
            warn!("failed to save preferences: {err:#}");
            Err(internal_error(err))
        }
    }
}

pub(crate) async fn lock_options() -> Json<Vec<LockOptionResponse>> {
    Json(
        LOCK_DURATIONS
            .iter()
            .map(|option| LockOptionResponse {
                label: option.label.to_owned(),
                duration_seconds: option.seconds,
                description: option.description.to_owned(),
            })
            .collect(),
    )
}
