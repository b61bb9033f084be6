use crate::database::Database;
use crate::errors::{Result, WalletEngineError};
use crate::metrics;
use crate::models::{ReconciliationReport, ReconciliationStatus};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Recomputes wallet balances from their completed ledger entries and
/// records classified reports. The ledger is the ground truth; the wallet's
/// balance column is a cached projection of it.
pub struct ReconciliationService {
    db: Arc<Database>,
}

/// Compare a stored balance against the recalculated one.
pub fn classify(stored: Decimal, calculated: Decimal) -> (ReconciliationStatus, String) {
    let difference = stored - calculated;

    if difference.is_zero() {
        (ReconciliationStatus::Match, "Balance matches".to_string())
    } else {
        (
            ReconciliationStatus::Mismatch,
            format!(
                "Balance mismatch detected: stored={}, calculated={}, difference={}",
                stored, calculated, difference
            ),
        )
    }
}

impl ReconciliationService {
    pub fn new(db: Arc<Database>) -> Self {
        ReconciliationService { db }
    }

    /// Recompute one wallet's balance from its COMPLETED entries, persist a
    /// classified report and return it.
    pub async fn reconcile_wallet(&self, wallet_id: i64) -> Result<ReconciliationReport> {
        let wallet = self
            .db
            .get_wallet(wallet_id)
            .await?
            .ok_or_else(|| WalletEngineError::NotFound(format!("wallet {}", wallet_id)))?;

        metrics::RECONCILIATION_RUNS.inc();

        let credits = self.db.sum_completed_credits(wallet_id).await?;
        let debits = self.db.sum_completed_debits(wallet_id).await?;
        let calculated = credits - debits;

        let stored = wallet.balance;
        let difference = stored - calculated;
        let (status, notes) = classify(stored, calculated);

        if status == ReconciliationStatus::Mismatch {
            metrics::RECONCILIATION_MISMATCHES.inc();
            warn!(
                wallet_id,
                %stored,
                %calculated,
                %difference,
                "Reconciliation mismatch"
            );
        }

        let report = self
            .db
            .insert_report(wallet_id, stored, calculated, difference, status, &notes)
            .await?;

        Ok(report)
    }

    /// Reconcile every wallet. Per-wallet failures are logged and skipped so
    /// one broken wallet cannot abort the batch.
    pub async fn reconcile_all(&self) -> Result<Vec<ReconciliationReport>> {
        let wallets = self.db.list_wallets_for_reconciliation().await?;
        let mut reports = Vec::with_capacity(wallets.len());

        for wallet in wallets {
            match self.reconcile_wallet(wallet.id).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(wallet_id = wallet.id, "Failed to reconcile wallet: {}", e);
                }
            }
        }

        info!(reconciled = reports.len(), "Bulk reconciliation complete");
        Ok(reports)
    }

    pub async fn reports(&self, page: i64, size: i64) -> Result<Vec<ReconciliationReport>> {
        let offset = (page - 1) * size;
        self.db.list_reports(offset, size).await
    }

    pub async fn mismatches(&self, page: i64, size: i64) -> Result<Vec<ReconciliationReport>> {
        let offset = (page - 1) * size;
        self.db.list_mismatch_reports(offset, size).await
    }

    pub async fn reports_for_wallet(&self, wallet_id: i64) -> Result<Vec<ReconciliationReport>> {
        self.db.list_reports_by_wallet(wallet_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_classify_match() {
        let (status, notes) = classify(dec!(150.00), dec!(150.00));
        assert_eq!(status, ReconciliationStatus::Match);
        assert_eq!(notes, "Balance matches");
    }

    #[test]
    fn test_classify_mismatch_carries_all_three_values() {
        let (status, notes) = classify(dec!(1000.00), dec!(95.00));
        assert_eq!(status, ReconciliationStatus::Mismatch);
        assert!(notes.contains("stored=1000.00"));
        assert!(notes.contains("calculated=95.00"));
        assert!(notes.contains("difference=905.00"));
    }

    #[test]
    fn test_classify_negative_difference() {
        // Stored below calculated: money the ledger says exists but the
        // wallet row lost.
        let (status, notes) = classify(dec!(50.00), dec!(75.00));
        assert_eq!(status, ReconciliationStatus::Mismatch);
        assert!(notes.contains("difference=-25.00"));
    }

    #[test]
    fn test_classify_zero_calculated() {
        // A wallet with a nonzero balance but no completed entries must not
        // reconcile clean.
        let (status, _) = classify(dec!(10.00), Decimal::ZERO);
        assert_eq!(status, ReconciliationStatus::Mismatch);
    }

    #[test]
    fn test_classify_zero_both() {
        let (status, _) = classify(Decimal::ZERO, Decimal::ZERO);
        assert_eq!(status, ReconciliationStatus::Match);
    }

    #[test]
    fn test_classify_small_difference_is_still_mismatch() {
        let (status, _) = classify(dec!(100.01), dec!(100.00));
        assert_eq!(status, ReconciliationStatus::Mismatch);
    }
}
