use crate::errors::Result;
use crate::models::PageQuery;
use crate::reconciliation::ReconciliationService;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::sync::Arc;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

fn page_params(query: &PageQuery) -> (i64, i64) {
    let page = query.page.unwrap_or(1).max(1);
    let size = query.size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, size)
}

/// Reconcile every wallet
pub async fn run_reconciliation(
    service: web::Data<Arc<ReconciliationService>>,
) -> Result<HttpResponse> {
    let reports = service.reconcile_all().await?;
    let mismatches = reports.iter().filter(|r| r.has_mismatch()).count();

    Ok(HttpResponse::Ok().json(json!({
        "total_wallets": reports.len(),
        "mismatches": mismatches,
        "reports": reports
    })))
}

/// Reconcile a single wallet
pub async fn reconcile_wallet(
    service: web::Data<Arc<ReconciliationService>>,
    wallet_id: web::Path<i64>,
) -> Result<HttpResponse> {
    let report = service.reconcile_wallet(*wallet_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "severity": report.status.severity(),
        "report": report
    })))
}

/// List reconciliation reports, newest first
pub async fn list_reports(
    service: web::Data<Arc<ReconciliationService>>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse> {
    let (page, size) = page_params(&query);
    let reports = service.reports(page, size).await?;

    Ok(HttpResponse::Ok().json(json!({
        "page": page,
        "size": size,
        "reports": reports
    })))
}

/// List only MISMATCH reports, newest first
pub async fn list_mismatches(
    service: web::Data<Arc<ReconciliationService>>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse> {
    let (page, size) = page_params(&query);
    let reports = service.mismatches(page, size).await?;

    Ok(HttpResponse::Ok().json(json!({
        "page": page,
        "size": size,
        "reports": reports
    })))
}

/// Configure routes
pub fn configure_reconciliation_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/reconciliation")
            .route("/run", web::post().to(run_reconciliation))
            .route("/wallets/{wallet_id}", web::post().to(reconcile_wallet))
            .route("/reports", web::get().to(list_reports))
            .route("/mismatches", web::get().to(list_mismatches)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_params_defaults() {
        let query = PageQuery {
            page: None,
            size: None,
        };
        assert_eq!(page_params(&query), (1, 20));
    }

    #[test]
    fn test_page_params_clamped() {
        let query = PageQuery {
            page: Some(0),
            size: Some(5000),
        };
        assert_eq!(page_params(&query), (1, 100));
    }
}
