//! HTTP routes.
//!
//! Amounts travel as decimal strings in both directions.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tally_common::{parse_amount, AccountId, AmountParseError, ErrorKind};
use tally_ledger::{Account, AccountService};

use crate::errors;
use crate::metrics::LedgerMetrics;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn AccountService>,
    pub metrics: Arc<LedgerMetrics>,
}

impl AppState {
    pub fn new(service: Arc<dyn AccountService>) -> Self {
        Self {
            service,
            metrics: Arc::new(LedgerMetrics::new()),
        }
    }

    fn fail(&self, err: tally_common::LedgerError) -> Response {
        self.metrics.operation_failed(err.kind());
        errors::ledger_error_to_response(err)
    }

    fn reject_amount(&self, err: AmountParseError) -> Response {
        self.metrics.operation_failed(ErrorKind::Validation);
        errors::amount_error_to_response(err)
    }
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: AccountId,
    pub balance: Decimal,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            balance: account.balance,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositResponse {
    pub account_id: AccountId,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub destination_account_id: AccountId,
    pub amount: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub source_account_id: AccountId,
    pub destination_account_id: AccountId,
    pub amount: Decimal,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/accounts", post(create_account))
        .route("/accounts/:account_id", get(get_account))
        .route("/accounts/:account_id/deposits", post(deposit))
        .route("/accounts/:account_id/transfers", post(transfer))
        .with_state(state)
}

async fn health() -> Response {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
}

async fn metrics(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
        .into_response()
}

pub async fn create_account(State(state): State<AppState>) -> Response {
    match state.service.create_account().await {
        Ok(account) => {
            state.metrics.account_created();
            (StatusCode::CREATED, Json(AccountResponse::from(account))).into_response()
        }
        Err(e) => state.fail(e),
    }
}

pub async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<AccountId>,
) -> Response {
    match state.service.get_account_by_id(account_id).await {
        Ok(Some(account)) => (StatusCode::OK, Json(AccountResponse::from(account))).into_response(),
        Ok(None) => errors::json_error(
            StatusCode::NOT_FOUND,
            "ACCOUNT_NOT_FOUND",
            format!("The account with id {} does not exist", account_id),
        ),
        Err(e) => state.fail(e),
    }
}

pub async fn deposit(
    State(state): State<AppState>,
    Path(account_id): Path<AccountId>,
    Json(body): Json<DepositRequest>,
) -> Response {
    let amount = match parse_amount(&body.amount) {
        Ok(amount) => amount,
        Err(e) => return state.reject_amount(e),
    };

    match state.service.deposit(account_id, amount).await {
        Ok(deposit) => {
            state.metrics.deposit_completed();
            let body = DepositResponse {
                account_id: deposit.account_id,
                amount: deposit.amount,
            };
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(e) => state.fail(e),
    }
}

pub async fn transfer(
    State(state): State<AppState>,
    Path(source_account_id): Path<AccountId>,
    Json(body): Json<TransferRequest>,
) -> Response {
    let amount = match parse_amount(&body.amount) {
        Ok(amount) => amount,
        Err(e) => return state.reject_amount(e),
    };

    match state
        .service
        .transfer(source_account_id, body.destination_account_id, amount)
        .await
    {
        Ok(transfer) => {
            state.metrics.transfer_completed();
            let body = TransferResponse {
                source_account_id: transfer.source_account_id,
                destination_account_id: transfer.destination_account_id,
                amount: transfer.amount,
            };
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(e) => state.fail(e),
    }
}
