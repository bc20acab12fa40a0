//! Mapping of ledger errors to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use tally_common::{AccountRole, AmountParseError, ErrorKind, LedgerError};

/// Status code for a ledger error.
///
/// A missing destination is a bad reference in the request body, so it is a
/// 400 rather than a 404 on the addressed resource.
pub fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::AccountNotFound {
            role: AccountRole::Destination,
            ..
        } => StatusCode::BAD_REQUEST,
        LedgerError::TransactionConflict(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => match err.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Consistency | ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

pub fn ledger_error_to_response(err: LedgerError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        error!(error = %err, code = err.error_code(), "Ledger operation failed");
    }

    let mut body = json!({
        "error": err.error_code(),
        "message": err.to_string(),
    });
    if let Some(field) = err.field() {
        body["field"] = json!(field);
    }
    (status, axum::Json(body)).into_response()
}

pub fn amount_error_to_response(err: AmountParseError) -> Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({
            "error": "INVALID_AMOUNT_FORMAT",
            "message": err.to_string(),
            "field": "amount",
        })),
    )
        .into_response()
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tally_common::AccountId;

    #[test]
    fn test_status_mapping() {
        let id = AccountId::new(1);
        assert_eq!(
            status_for(&LedgerError::InvalidAmount { amount: dec!(-1) }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&LedgerError::AmountOutOfRange {
                account_id: id,
                amount: dec!(0.01),
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&LedgerError::not_found(id, AccountRole::Account)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&LedgerError::not_found(id, AccountRole::Source)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&LedgerError::not_found(id, AccountRole::Destination)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&LedgerError::InsufficientBalance {
                account_id: id,
                required: dec!(2),
                available: dec!(1),
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&LedgerError::AccountCreation(id)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&LedgerError::TransactionConflict("40001".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
