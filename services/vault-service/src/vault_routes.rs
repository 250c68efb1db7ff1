use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use tv_api_types::protocol::USDC_DECIMALS;
use tv_api_types::{
    DepositPreviewResponse, DepositRecord, DepositRequest, DepositView, TxSubmitResponse,
    VaultStateResponse, WalletAddress, WithdrawAction, WithdrawRequest,
};
use tv_format::{
    checksum_address, days_until, deposit_preview, emergency_preview, format_date,
    format_time_remaining, format_token, format_usd, from_base_units, is_valid_amount,
    lock_duration_label, meets_minimum_deposit, progress_percentage, to_base_units,
    tx_explorer_url, validate_deposit_input, validate_lock_duration, validate_minimum_deposit,
};
use tv_wallet_core::{
    TxOutcome, contract_error_message, is_user_rejection, unix_now, withdraw_action,
};

use crate::{
    ApiError, ApiResult, AppState, bad_request, conflict, not_found, unauthorized, upstream_error,
};

fn deposit_view(record: &DepositRecord, now: u64) -> DepositView {
    let action = withdraw_action(record, now);
    let emergency = (action == Some(WithdrawAction::EmergencyWithdraw))
        .then(|| emergency_preview(record.principal));

    DepositView {
        id: record.id,
        owner: checksum_address(&record.owner.0),
        principal: record.principal.to_string(),
        principal_formatted: format_token(record.principal, USDC_DECIMALS, "USDC"),
        start_time: record.start_time,
        unlock_time: record.unlock_time,
        withdrawn: record.withdrawn,
        is_unlocked: record.is_unlocked(now),
        time_remaining: format_time_remaining(record.unlock_time, now),
        days_remaining: days_until(record.unlock_time, now),
        progress: progress_percentage(record.start_time, record.unlock_time, now),
        lock_label: lock_duration_label(record.unlock_time.saturating_sub(record.start_time)),
        start_date: format_date(record.start_time),
        unlock_date: format_date(record.unlock_time),
        action,
        penalty: emergency.as_ref().map(|preview| preview.penalty.to_string()),
        payout: emergency.as_ref().map(|preview| preview.payout.to_string()),
    }
}

async fn vault_response(state: &AppState) -> VaultStateResponse {
    let account = state.vault.account().await;
    let vault = state.vault.state().await;
    let now = unix_now();
    let total_locked = vault.total_locked();

    VaultStateResponse {
        address: account.map(|address| checksum_address(&address.0)),
        usdc_balance: vault.usdc_balance.to_string(),
        usdc_balance_formatted: format_token(vault.usdc_balance, USDC_DECIMALS, "USDC"),
        allowance: vault.allowance.to_string(),
        deposits: vault.deposits.iter().map(|record| deposit_view(record, now)).collect(),
        total_locked: total_locked.to_string(),
        total_locked_usd: format_usd(total_locked, USDC_DECIMALS),
        is_loading: vault.is_loading,
        tx_pending: vault.tx_pending,
        tx_status: vault.tx_status,
        tx_phase: vault.tx_phase,
    }
}

async fn require_connected(state: &AppState) -> Result<WalletAddress, ApiError> {
    state
        .connector
        .address()
        .await
        .ok_or_else(|| unauthorized("wallet not connected"))
}

/// Preconditions shared by every transaction endpoint, checked in order.
async fn gate(state: &AppState) -> Result<WalletAddress, ApiError> {
    let address = require_connected(state).await?;
    if !state.connector.is_correct_chain().await {
        return Err(conflict(format!(
            "switch network first: connect to {}",
            state.connector.target().name
        )));
    }
    if state.vault.state().await.tx_pending {
        return Err(conflict("another transaction is pending"));
    }
    Ok(address)
}

async fn owned_deposit(state: &AppState, deposit_id: u64) -> Result<DepositRecord, ApiError> {
    let record = state
        .vault
        .state()
        .await
        .deposits
        .into_iter()
        .find(|record| record.id == deposit_id)
        .ok_or_else(|| not_found(format!("deposit {deposit_id} not found")))?;
    if record.withdrawn {
        return Err(conflict(format!("deposit {deposit_id} already withdrawn")));
    }
    Ok(record)
}

/// Map a transaction result onto the response contract: rejections are a
/// cancelled 200 without a toast, other failures a toast and a 502.
async fn tx_response(
    state: &AppState,
    result: anyhow::Result<TxOutcome>,
    failure_title: &str,
) -> ApiResult<TxSubmitResponse> {
    let tx_status = state.vault.state().await.tx_status;
    match result {
        Ok(outcome) => Ok(Json(TxSubmitResponse {
            cancelled: false,
            explorer_url: Some(tx_explorer_url(
                state.connector.target().block_explorer,
                &outcome.hash.0,
            )),
            tx_hash: Some(outcome.hash.0),
            block_number: outcome.block_number,
            tx_status,
        })),
        Err(err) if is_user_rejection(&err) => {
            info!("{failure_title}: cancelled in wallet");
            Ok(Json(TxSubmitResponse {
                cancelled: true,
                tx_hash: None,
                block_number: None,
                tx_status,
                explorer_url: None,
            }))
        }
        Err(err) => {
            warn!("{failure_title}: {err:#}");
            state.toasts.report_failure(failure_title, &err).await;
            Err(upstream_error(contract_error_message(&err)))
        }
    }
}

pub(crate) async fn get_vault(State(state): State<Arc<AppState>>) -> Json<VaultStateResponse> {
    Json(vault_response(&state).await)
}

pub(crate) async fn refresh(State(state): State<Arc<AppState>>) -> ApiResult<VaultStateResponse> {
    require_connected(&state).await?;
    state.vault.refresh().await;
    Ok(Json(vault_response(&state).await))
}

#[derive(Debug, Deserialize)]
pub(crate) struct PreviewQuery {
    pub(crate) amount: String,
}

/// Router fee breakdown for an amount typed into the deposit form.
pub(crate) async fn preview(
    Query(query): Query<PreviewQuery>,
) -> ApiResult<DepositPreviewResponse> {
    if !is_valid_amount(&query.amount) {
        return Err(bad_request("Invalid amount"));
    }
    let gross = to_base_units(&query.amount, USDC_DECIMALS)
        .map_err(|err| bad_request(err.to_string()))?;
    let preview = deposit_preview(gross);

    Ok(Json(DepositPreviewResponse {
        gross: preview.gross.to_string(),
        fee: preview.fee.to_string(),
        principal: preview.principal.to_string(),
        principal_formatted: format_token(preview.principal, USDC_DECIMALS, "USDC"),
        meets_minimum: meets_minimum_deposit(gross),
    }))
}

pub(crate) async fn deposit(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DepositRequest>,
) -> ApiResult<TxSubmitResponse> {
    gate(&state).await?;

    let balance = from_base_units(state.vault.state().await.usdc_balance, USDC_DECIMALS);
    let amount = validate_deposit_input(&request.amount, &balance)
        .map_err(|err| bad_request(err.to_string()))?;
    validate_minimum_deposit(amount).map_err(|err| bad_request(err.to_string()))?;
    validate_lock_duration(request.duration_seconds).map_err(|err| bad_request(err.to_string()))?;

    let result = state
        .vault
        .deposit(request.amount.trim(), request.duration_seconds)
        .await;
    tx_response(&state, result, "Deposit failed").await
}

pub(crate) async fn withdraw(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WithdrawRequest>,
) -> ApiResult<TxSubmitResponse> {
    gate(&state).await?;

    let record = owned_deposit(&state, request.deposit_id).await?;
    if !record.is_unlocked(unix_now()) {
        return Err(conflict(format!(
            "deposit {} is still locked; use emergency withdraw",
            record.id
        )));
    }

    let result = state.vault.withdraw(record.id).await;
    tx_response(&state, result, "Withdrawal failed").await
}

pub(crate) async fn emergency_withdraw(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WithdrawRequest>,
) -> ApiResult<TxSubmitResponse> {
    gate(&state).await?;

    let record = owned_deposit(&state, request.deposit_id).await?;
    let result = state.vault.emergency_withdraw(record.id).await;
    tx_response(&state, result, "Emergency withdrawal failed").await
}

#[cfg(test)]
mod tests {
    use crate::test_support::{ALICE, Harness};
    use axum::http::StatusCode;
    use serde_json::json;
    use std::time::Duration;
    use tv_api_types::ChainId;
    use tv_format::format_date;
    use tv_wallet_core::testing::ContractCall;
    use tv_wallet_core::unix_now;

    fn deposit_body(amount: &str, duration_seconds: u64) -> serde_json::Value {
        json!({ "amount": amount, "duration_seconds": duration_seconds })
    }

    #[tokio::test]
    async fn transactions_require_a_connection() {
        let harness = Harness::new(ChainId(8453));
        let (status, body) = harness
            .call("POST", "/vault/deposit", Some(deposit_body("10", 259_200)))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "wallet not connected");
    }

    #[tokio::test]
    async fn wrong_chain_refuses_transactions() {
        let harness = Harness::connected(ChainId(1)).await;
        harness.contracts.set_balance(50_000_000);

        let (status, body) = harness
            .call("POST", "/vault/deposit", Some(deposit_body("10", 259_200)))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().starts_with("switch network first"));

        let (status, _) = harness
            .call("POST", "/vault/withdraw", Some(json!({ "deposit_id": 1 })))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(harness.contracts.calls().iter().all(|call| !matches!(
            call,
            ContractCall::RouterDeposit { .. } | ContractCall::Withdraw(_)
        )));
    }

    #[tokio::test]
    async fn deposit_input_is_validated() {
        let harness = Harness::connected(ChainId(8453)).await;
        harness.contracts.set_balance(5_000_000);
        harness.call("POST", "/vault/refresh", None).await;

        for (amount, duration, message) in [
            ("", 259_200, "Enter an amount"),
            ("abc", 259_200, "Invalid amount"),
            ("6", 259_200, "Insufficient balance"),
            ("0.05", 259_200, "Minimum deposit is 0.1 USDC"),
            ("1", 60, "Lock duration of 60 seconds is not offered"),
        ] {
            let (status, body) = harness
                .call("POST", "/vault/deposit", Some(deposit_body(amount, duration)))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "amount {amount:?}");
            assert_eq!(body["error"], message);
        }
    }

    #[tokio::test]
    async fn deposit_then_withdraw_flow() {
        let harness = Harness::connected(ChainId(8453)).await;
        harness.contracts.set_balance(50_000_000);
        harness.call("POST", "/vault/refresh", None).await;

        let (status, body) = harness
            .call("POST", "/vault/deposit", Some(deposit_body("10", 259_200)))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cancelled"], false);
        assert_eq!(body["tx_status"], "Deposit successful!");
        let hash = body["tx_hash"].as_str().unwrap();
        assert_eq!(body["explorer_url"], format!("https://basescan.org/tx/{hash}"));

        let (_, vault) = harness.call("GET", "/vault", None).await;
        assert_eq!(vault["address"], ALICE);
        assert_eq!(vault["usdc_balance"], "40000000");
        assert_eq!(vault["usdc_balance_formatted"], "40.00 USDC");
        assert_eq!(vault["deposits"][0]["principal"], "9950000");
        assert_eq!(vault["deposits"][0]["is_unlocked"], false);
        assert_eq!(vault["deposits"][0]["action"], "emergency_withdraw");
        assert_eq!(vault["deposits"][0]["lock_label"], "3 Days");
        assert_eq!(vault["deposits"][0]["days_remaining"], 3);
        assert_eq!(vault["deposits"][0]["progress"], 0);
        assert_eq!(vault["deposits"][0]["penalty"], "995000");
        assert_eq!(vault["deposits"][0]["payout"], "8955000");
        assert_eq!(vault["total_locked_usd"], "$9.95");
        assert_eq!(vault["tx_pending"], false);
        assert_eq!(vault["tx_phase"], "idle");

        let (status, body) = harness
            .call("POST", "/vault/withdraw", Some(json!({ "deposit_id": 1 })))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("still locked"));

        let (status, body) = harness
            .call("POST", "/vault/emergency-withdraw", Some(json!({ "deposit_id": 1 })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tx_status"], "Emergency withdrawal successful!");

        let (status, _) = harness
            .call("POST", "/vault/emergency-withdraw", Some(json!({ "deposit_id": 1 })))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, history) = harness.call("GET", "/history", None).await;
        let kinds: Vec<&str> = history
            .as_array()
            .unwrap()
            .iter()
            .map(|record| record["type"].as_str().unwrap())
            .collect();
        assert_eq!(kinds, vec!["emergency_withdraw", "deposit", "approve"]);
    }

    #[tokio::test]
    async fn unlocked_deposit_withdraws_normally() {
        let harness = Harness::connected(ChainId(8453)).await;
        let now = unix_now();
        harness.contracts.add_deposit(ALICE, 2_000_000, now - 600, now - 1);
        harness.call("POST", "/vault/refresh", None).await;

        let (_, vault) = harness.call("GET", "/vault", None).await;
        assert_eq!(vault["deposits"][0]["is_unlocked"], true);
        assert_eq!(vault["deposits"][0]["time_remaining"], "Unlocked");
        assert_eq!(vault["deposits"][0]["action"], "withdraw");
        assert_eq!(vault["deposits"][0]["progress"], 100);
        assert_eq!(vault["deposits"][0]["days_remaining"], 0);
        assert_eq!(vault["deposits"][0]["start_date"], format_date(now - 600));
        assert_eq!(vault["deposits"][0]["unlock_date"], format_date(now - 1));
        assert_eq!(vault["deposits"][0]["penalty"], serde_json::Value::Null);
        assert_eq!(vault["deposits"][0]["payout"], serde_json::Value::Null);

        let (status, body) = harness
            .call("POST", "/vault/withdraw", Some(json!({ "deposit_id": 1 })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["tx_hash"].as_str().unwrap().starts_with("0x"));

        let (status, _) = harness
            .call("POST", "/vault/withdraw", Some(json!({ "deposit_id": 9 })))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn preview_breaks_down_the_router_fee() {
        let harness = Harness::new(ChainId(8453));

        let (status, body) = harness.call("GET", "/vault/preview?amount=10", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["gross"], "10000000");
        assert_eq!(body["fee"], "50000");
        assert_eq!(body["principal"], "9950000");
        assert_eq!(body["principal_formatted"], "9.95 USDC");
        assert_eq!(body["meets_minimum"], true);

        let (_, body) = harness.call("GET", "/vault/preview?amount=0.05", None).await;
        assert_eq!(body["meets_minimum"], false);

        let (status, body) = harness.call("GET", "/vault/preview?amount=abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid amount");
    }

    #[tokio::test]
    async fn pending_transaction_blocks_another_submission() {
        let harness = Harness::connected(ChainId(8453)).await;
        harness.contracts.set_balance(50_000_000);
        harness.contracts.set_allowance(u128::MAX);
        harness.call("POST", "/vault/refresh", None).await;
        harness.contracts.hold_receipts();

        let first = tokio::spawn({
            let harness = harness.clone();
            async move {
                harness
                    .call("POST", "/vault/deposit", Some(deposit_body("10", 259_200)))
                    .await
            }
        });

        for _ in 0..100 {
            if harness.state.vault.state().await.tx_pending {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(harness.state.vault.state().await.tx_pending);

        let (status, body) = harness
            .call("POST", "/vault/deposit", Some(deposit_body("5", 259_200)))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "another transaction is pending");

        harness.contracts.release_receipts();
        let (status, body) = first.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cancelled"], false);

        let router_deposits = harness
            .contracts
            .calls()
            .into_iter()
            .filter(|call| matches!(call, ContractCall::RouterDeposit { .. }))
            .count();
        assert_eq!(router_deposits, 1);
    }

    #[tokio::test]
    async fn rejection_is_cancelled_without_toast() {
        let harness = Harness::connected(ChainId(8453)).await;
        harness.contracts.set_balance(50_000_000);
        harness.call("POST", "/vault/refresh", None).await;
        harness.contracts.reject_writes(true);

        let (status, body) = harness
            .call("POST", "/vault/deposit", Some(deposit_body("10", 604_800)))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cancelled"], true);

        let (_, toasts) = harness.call("GET", "/toasts", None).await;
        assert_eq!(toasts, json!([]));
    }

    #[tokio::test]
    async fn revert_produces_error_toast() {
        let harness = Harness::connected(ChainId(8453)).await;
        let now = unix_now();
        harness.contracts.add_deposit(ALICE, 2_000_000, now - 600, now + 600);
        harness.call("POST", "/vault/refresh", None).await;
        harness.contracts.revert_next();

        let (status, body) = harness
            .call("POST", "/vault/emergency-withdraw", Some(json!({ "deposit_id": 1 })))
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Transaction failed - contract rejected");

        let (_, toasts) = harness.call("GET", "/toasts", None).await;
        let errors: Vec<_> = toasts
            .as_array()
            .unwrap()
            .iter()
            .filter(|toast| toast["type"] == "error")
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["title"], "Emergency withdrawal failed");
        assert_eq!(errors[0]["duration_ms"], serde_json::Value::Null);

        let (_, vault) = harness.call("GET", "/vault", None).await;
        assert_eq!(vault["tx_phase"], "idle");
        assert_eq!(vault["tx_pending"], false);
    }
}
