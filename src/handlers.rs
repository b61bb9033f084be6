use crate::errors::{Result, WalletEngineError};
use crate::metrics;
use crate::models::{
    BalanceResponse, FundWalletRequest, HistoryQuery, TransferRequest, WithdrawRequest,
};
use crate::security_middleware::auth::Claims;
use crate::services::WalletService;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use serde_json::json;
use std::sync::Arc;

const DEFAULT_HISTORY_LIMIT: i64 = 20;
const MAX_HISTORY_LIMIT: i64 = 100;

fn clamp_history_limit(requested: Option<i64>) -> i64 {
    requested
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

pub(crate) fn validate<T: validator::Validate>(value: &T) -> Result<()> {
    value
        .validate()
        .map_err(|e| WalletEngineError::Validation(e.to_string()))
}

pub(crate) fn authenticated_user_id(req: &HttpRequest) -> Result<i64> {
    req.extensions()
        .get::<Claims>()
        .map(|claims| claims.user_id)
        .ok_or(WalletEngineError::Unauthorized)
}

/// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "wallet-engine",
        "version": "1.0.0"
    }))
}

/// Prometheus metrics endpoint
pub async fn metrics_endpoint() -> HttpResponse {
    match metrics::metrics_handler() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => HttpResponse::InternalServerError().json(json!({
            "error": "Failed to gather metrics",
            "details": e.to_string()
        })),
    }
}

/// Get the authenticated user's wallet
pub async fn get_wallet(
    service: web::Data<Arc<WalletService>>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = authenticated_user_id(&req)?;
    let wallet = service.get_wallet_by_user(user_id).await?;

    Ok(HttpResponse::Ok().json(wallet))
}

/// Get the authenticated user's wallet balance
pub async fn get_balance(
    service: web::Data<Arc<WalletService>>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = authenticated_user_id(&req)?;
    let wallet = service.get_wallet_by_user(user_id).await?;

    Ok(HttpResponse::Ok().json(BalanceResponse {
        wallet_id: wallet.id,
        balance: wallet.balance,
        currency: wallet.currency,
    }))
}

/// Fund the authenticated user's wallet
pub async fn fund_wallet(
    service: web::Data<Arc<WalletService>>,
    req: HttpRequest,
    request: web::Json<FundWalletRequest>,
) -> Result<HttpResponse> {
    let user_id = authenticated_user_id(&req)?;
    let request = request.into_inner();
    validate(&request)?;

    let wallet = service.get_wallet_by_user(user_id).await?;
    let (user_entry, system_entry) = service
        .fund(wallet.id, request.amount, &request.reference, &request.description)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "user_entry": user_entry,
        "system_entry": system_entry
    })))
}

/// Withdraw from the authenticated user's wallet
pub async fn withdraw_funds(
    service: web::Data<Arc<WalletService>>,
    req: HttpRequest,
    request: web::Json<WithdrawRequest>,
) -> Result<HttpResponse> {
    let user_id = authenticated_user_id(&req)?;
    let request = request.into_inner();
    validate(&request)?;

    let wallet = service.get_wallet_by_user(user_id).await?;
    let (user_entry, system_entry) = service
        .withdraw(wallet.id, request.amount, &request.reference, &request.description)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "user_entry": user_entry,
        "system_entry": system_entry
    })))
}

/// Transfer from the authenticated user's wallet to another wallet
pub async fn transfer_funds(
    service: web::Data<Arc<WalletService>>,
    req: HttpRequest,
    request: web::Json<TransferRequest>,
) -> Result<HttpResponse> {
    let user_id = authenticated_user_id(&req)?;
    let request = request.into_inner();
    validate(&request)?;

    let wallet = service.get_wallet_by_user(user_id).await?;
    let (outgoing_entry, incoming_entry) = service
        .transfer(
            wallet.id,
            request.to_wallet_id,
            request.amount,
            &request.reference,
            &request.description,
        )
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "outgoing_entry": outgoing_entry,
        "incoming_entry": incoming_entry
    })))
}

/// Cursor-paginated transaction history for the authenticated user's wallet
pub async fn transaction_history(
    service: web::Data<Arc<WalletService>>,
    req: HttpRequest,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse> {
    let user_id = authenticated_user_id(&req)?;
    let wallet = service.get_wallet_by_user(user_id).await?;

    let limit = clamp_history_limit(query.limit);
    let (entries, next_cursor) = service
        .transaction_history(wallet.id, query.cursor.as_deref(), limit)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "entries": entries,
        "next_cursor": next_cursor
    })))
}

/// Configure routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/wallets")
            .route("/me", web::get().to(get_wallet))
            .route("/me/balance", web::get().to(get_balance))
            .route("/me/fund", web::post().to(fund_wallet))
            .route("/me/withdraw", web::post().to(withdraw_funds))
            .route("/me/transfer", web::post().to(transfer_funds))
            .route("/me/transactions", web::get().to(transaction_history)),
    )
    .route("/metrics", web::get().to(metrics_endpoint))
    .route("/health", web::get().to(health_check));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_limit_defaults_to_twenty() {
        assert_eq!(clamp_history_limit(None), 20);
    }

    #[test]
    fn test_history_limit_clamped_to_range() {
        assert_eq!(clamp_history_limit(Some(0)), 1);
        assert_eq!(clamp_history_limit(Some(-5)), 1);
        assert_eq!(clamp_history_limit(Some(1)), 1);
        assert_eq!(clamp_history_limit(Some(100)), 100);
        assert_eq!(clamp_history_limit(Some(1000)), 100);
    }
}
