use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WalletEngineError>;

#[derive(Error, Debug)]
pub enum WalletEngineError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("invalid cursor")]
    InvalidCursor,

    #[error("cannot transfer to the same wallet")]
    SameWalletTransfer,

    #[error("wallet is not active")]
    WalletInactive,

    #[error("destination wallet not found or not active")]
    DestinationInactive,

    #[error("direct transfers to the system wallet are not allowed")]
    SystemWalletForbidden,

    #[error("{0} not found")]
    NotFound(String),

    #[error("duplicate reference: {0}")]
    DuplicateReference(String),

    #[error("insufficient funds: available={available}, requested={requested}")]
    InsufficientFunds {
        available: Decimal,
        requested: Decimal,
    },

    #[error("wallet balance mismatch detected: stored={stored}, calculated={calculated}, difference={difference}. Postings are blocked until reconciliation is resolved")]
    ReconciliationBlocked {
        stored: Decimal,
        calculated: Decimal,
        difference: Decimal,
    },

    #[error("wallet version mismatch - concurrent modification detected")]
    ConcurrentModification,

    #[error("invalid or expired credentials")]
    Unauthorized,

    #[error("user with this email already exists")]
    EmailTaken,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for WalletEngineError {
    fn from(err: serde_json::Error) -> Self {
        WalletEngineError::Internal(format!("JSON serialization error: {}", err))
    }
}

impl ResponseError for WalletEngineError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let error_message = self.to_string();

        HttpResponse::build(status_code).json(json!({
            "error": {
                "code": status_code.as_u16(),
                "message": error_message,
                "type": self.error_type()
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            WalletEngineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WalletEngineError::Validation(_) => StatusCode::BAD_REQUEST,
            WalletEngineError::InvalidAmount => StatusCode::BAD_REQUEST,
            WalletEngineError::InvalidCursor => StatusCode::BAD_REQUEST,
            WalletEngineError::SameWalletTransfer => StatusCode::BAD_REQUEST,
            WalletEngineError::WalletInactive => StatusCode::CONFLICT,
            WalletEngineError::DestinationInactive => StatusCode::NOT_FOUND,
            WalletEngineError::SystemWalletForbidden => StatusCode::BAD_REQUEST,
            WalletEngineError::NotFound(_) => StatusCode::NOT_FOUND,
            WalletEngineError::DuplicateReference(_) => StatusCode::CONFLICT,
            WalletEngineError::InsufficientFunds { .. } => StatusCode::CONFLICT,
            WalletEngineError::ReconciliationBlocked { .. } => StatusCode::CONFLICT,
            WalletEngineError::ConcurrentModification => StatusCode::CONFLICT,
            WalletEngineError::Unauthorized => StatusCode::UNAUTHORIZED,
            WalletEngineError::EmailTaken => StatusCode::CONFLICT,
            WalletEngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl WalletEngineError {
    fn error_type(&self) -> &str {
        match self {
            WalletEngineError::Database(_) => "database_error",
            WalletEngineError::Validation(_) => "validation_error",
            WalletEngineError::InvalidAmount => "invalid_amount",
            WalletEngineError::InvalidCursor => "invalid_cursor",
            WalletEngineError::SameWalletTransfer => "same_wallet_transfer",
            WalletEngineError::WalletInactive => "wallet_inactive",
            WalletEngineError::DestinationInactive => "destination_inactive",
            WalletEngineError::SystemWalletForbidden => "system_wallet_forbidden",
            WalletEngineError::NotFound(_) => "not_found",
            WalletEngineError::DuplicateReference(_) => "duplicate_reference",
            WalletEngineError::InsufficientFunds { .. } => "insufficient_funds",
            WalletEngineError::ReconciliationBlocked { .. } => "reconciliation_blocked",
            WalletEngineError::ConcurrentModification => "concurrent_modification",
            WalletEngineError::Unauthorized => "unauthorized",
            WalletEngineError::EmailTaken => "duplicate_error",
            WalletEngineError::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_posting_failures_map_to_conflict() {
        assert_eq!(
            WalletEngineError::DuplicateReference("REF1".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            WalletEngineError::InsufficientFunds {
                available: dec!(95.00),
                requested: dec!(500.00),
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            WalletEngineError::ConcurrentModification.status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_validation_failures_map_to_bad_request() {
        assert_eq!(
            WalletEngineError::InvalidAmount.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WalletEngineError::InvalidCursor.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WalletEngineError::SameWalletTransfer.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WalletEngineError::SystemWalletForbidden.status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_reconciliation_blocked_carries_operator_detail() {
        let err = WalletEngineError::ReconciliationBlocked {
            stored: dec!(1000.00),
            calculated: dec!(95.00),
            difference: dec!(905.00),
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        let message = err.to_string();
        assert!(message.contains("stored=1000.00"));
        assert!(message.contains("calculated=95.00"));
        assert!(message.contains("difference=905.00"));
    }
}
