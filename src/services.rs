use crate::database::Database;
use crate::errors::{Result, WalletEngineError};
use crate::metrics;
use crate::models::{
    BalanceUpdate, Entry, EntryDirection, EntryPurpose, EntryStatus, NewEntry, Wallet,
};
use crate::reconciliation::ReconciliationService;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Pagination cursor over a wallet's entries: the (created_at, id) of the
/// last entry returned. Transported as base64 of its JSON encoding.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct EntryCursor {
    pub id: i64,
    pub created_at: DateTime<Utc>,
}

pub fn encode_cursor(cursor: &EntryCursor) -> Result<String> {
    let json = serde_json::to_vec(cursor)?;
    Ok(BASE64.encode(json))
}

pub fn decode_cursor(raw: &str) -> Result<EntryCursor> {
    let bytes = BASE64
        .decode(raw)
        .map_err(|_| WalletEngineError::InvalidCursor)?;
    serde_json::from_slice(&bytes).map_err(|_| WalletEngineError::InvalidCursor)
}

/// The posting engine. Applies funding, withdrawal and transfer operations
/// as balanced entry pairs under a single database transaction, gated by a
/// pre-posting reconciliation of the affected user wallets.
///
/// The engine is stateless between operations; concurrency safety is
/// delegated entirely to the store's transaction and the wallet version
/// guard. A posting that loses the version race fails with
/// ConcurrentModification and is never retried here.
pub struct WalletService {
    db: Arc<Database>,
    reconciliation: Arc<ReconciliationService>,
}

impl WalletService {
    pub fn new(db: Arc<Database>, reconciliation: Arc<ReconciliationService>) -> Self {
        WalletService { db, reconciliation }
    }

    pub async fn get_wallet(&self, wallet_id: i64) -> Result<Wallet> {
        self.db
            .get_wallet(wallet_id)
            .await?
            .ok_or_else(|| WalletEngineError::NotFound(format!("wallet {}", wallet_id)))
    }

    pub async fn get_wallet_by_user(&self, user_id: i64) -> Result<Wallet> {
        self.db
            .get_wallet_by_user(user_id)
            .await?
            .ok_or_else(|| WalletEngineError::NotFound(format!("wallet for user {}", user_id)))
    }

    pub async fn get_balance(&self, wallet_id: i64) -> Result<Decimal> {
        Ok(self.get_wallet(wallet_id).await?.balance)
    }

    pub async fn create_wallet(&self, user_id: i64, currency: &str) -> Result<Wallet> {
        self.db
            .get_user(user_id)
            .await?
            .ok_or_else(|| WalletEngineError::NotFound(format!("user {}", user_id)))?;

        if self.db.get_wallet_by_user(user_id).await?.is_some() {
            return Err(WalletEngineError::Validation(
                "user already has a wallet".to_string(),
            ));
        }

        self.db.create_wallet(user_id, currency).await
    }

    /// Fund a user wallet from the system wallet. Posts a DEBIT on the
    /// system wallet paired with a CREDIT on the user wallet, both
    /// WALLET_TOP_UP. Returns (user entry, system entry).
    pub async fn fund(
        &self,
        wallet_id: i64,
        amount: Decimal,
        reference: &str,
        description: &str,
    ) -> Result<(Entry, Entry)> {
        if amount <= Decimal::ZERO {
            return Err(WalletEngineError::InvalidAmount);
        }

        self.ensure_reconciled(wallet_id).await?;
        self.ensure_unused_reference(reference).await?;

        let user_wallet = self.get_wallet(wallet_id).await?;
        if !user_wallet.is_active() {
            return Err(WalletEngineError::WalletInactive);
        }

        let system_wallet = self.db.get_system_wallet().await?;
        if system_wallet.balance < amount {
            return Err(WalletEngineError::InsufficientFunds {
                available: system_wallet.balance,
                requested: amount,
            });
        }

        let system_before = system_wallet.balance;
        let system_after = system_before - amount;
        let user_before = user_wallet.balance;
        let user_after = user_before + amount;

        let system_entry = NewEntry {
            reference: format!("{}_system_debit", reference),
            wallet_id: system_wallet.id,
            direction: EntryDirection::Debit,
            purpose: EntryPurpose::WalletTopUp,
            amount,
            balance_before: system_before,
            balance_after: system_after,
            description: format!("System debit for funding: {}", description),
            metadata: r#"{"source": "funding"}"#.to_string(),
            status: EntryStatus::Completed,
            related_entry_id: None,
        };

        let user_entry = NewEntry {
            reference: reference.to_string(),
            wallet_id,
            direction: EntryDirection::Credit,
            purpose: EntryPurpose::WalletTopUp,
            amount,
            balance_before: user_before,
            balance_after: user_after,
            description: description.to_string(),
            metadata: r#"{"source": "funding"}"#.to_string(),
            status: EntryStatus::Completed,
            related_entry_id: None,
        };

        let (system_entry, user_entry) = self
            .db
            .execute_posting(
                system_entry,
                BalanceUpdate {
                    wallet_id: system_wallet.id,
                    new_balance: system_after,
                    expected_version: system_wallet.version,
                },
                user_entry,
                BalanceUpdate {
                    wallet_id,
                    new_balance: user_after,
                    expected_version: user_wallet.version,
                },
            )
            .await?;

        metrics::POSTINGS_COMMITTED
            .with_label_values(&["WALLET_TOP_UP"])
            .inc();
        info!(wallet_id, %amount, reference, "Wallet funded");

        self.spawn_post_posting_audit(vec![wallet_id]);

        Ok((user_entry, system_entry))
    }

    /// Withdraw from a user wallet into the system wallet. Posts a DEBIT on
    /// the user wallet paired with a CREDIT on the system wallet, both
    /// WITHDRAWAL. The system wallet is an issuer and is not funds-checked.
    /// Returns (user entry, system entry).
    pub async fn withdraw(
        &self,
        wallet_id: i64,
        amount: Decimal,
        reference: &str,
        description: &str,
    ) -> Result<(Entry, Entry)> {
        if amount <= Decimal::ZERO {
            return Err(WalletEngineError::InvalidAmount);
        }

        self.ensure_reconciled(wallet_id).await?;
        self.ensure_unused_reference(reference).await?;

        let user_wallet = self.get_wallet(wallet_id).await?;
        if !user_wallet.is_active() {
            return Err(WalletEngineError::WalletInactive);
        }
        if user_wallet.balance < amount {
            return Err(WalletEngineError::InsufficientFunds {
                available: user_wallet.balance,
                requested: amount,
            });
        }

        let system_wallet = self.db.get_system_wallet().await?;

        let system_before = system_wallet.balance;
        let system_after = system_before + amount;
        let user_before = user_wallet.balance;
        let user_after = user_before - amount;

        let system_entry = NewEntry {
            reference: format!("{}_system_credit", reference),
            wallet_id: system_wallet.id,
            direction: EntryDirection::Credit,
            purpose: EntryPurpose::Withdrawal,
            amount,
            balance_before: system_before,
            balance_after: system_after,
            description: format!("System credit for withdrawal: {}", description),
            metadata: r#"{"source": "withdrawal"}"#.to_string(),
            status: EntryStatus::Completed,
            related_entry_id: None,
        };

        let user_entry = NewEntry {
            reference: reference.to_string(),
            wallet_id,
            direction: EntryDirection::Debit,
            purpose: EntryPurpose::Withdrawal,
            amount,
            balance_before: user_before,
            balance_after: user_after,
            description: description.to_string(),
            metadata: r#"{"source": "withdrawal"}"#.to_string(),
            status: EntryStatus::Completed,
            related_entry_id: None,
        };

        let (system_entry, user_entry) = self
            .db
            .execute_posting(
                system_entry,
                BalanceUpdate {
                    wallet_id: system_wallet.id,
                    new_balance: system_after,
                    expected_version: system_wallet.version,
                },
                user_entry,
                BalanceUpdate {
                    wallet_id,
                    new_balance: user_after,
                    expected_version: user_wallet.version,
                },
            )
            .await?;

        metrics::POSTINGS_COMMITTED
            .with_label_values(&["WITHDRAWAL"])
            .inc();
        info!(wallet_id, %amount, reference, "Funds withdrawn");

        self.spawn_post_posting_audit(vec![wallet_id]);

        Ok((user_entry, system_entry))
    }

    /// Transfer between two user wallets. Posts a DEBIT on the source
    /// (reference "{ref}-OUT") paired with a CREDIT on the destination
    /// ("{ref}-IN"), both TRANSFER. Returns (outgoing entry, incoming
    /// entry).
    pub async fn transfer(
        &self,
        from_wallet_id: i64,
        to_wallet_id: i64,
        amount: Decimal,
        reference: &str,
        description: &str,
    ) -> Result<(Entry, Entry)> {
        if amount <= Decimal::ZERO {
            return Err(WalletEngineError::InvalidAmount);
        }
        if from_wallet_id == to_wallet_id {
            return Err(WalletEngineError::SameWalletTransfer);
        }

        let system_wallet = self.db.get_system_wallet().await?;

        self.ensure_reconciled(from_wallet_id).await?;
        // The system wallet is not a user wallet and never reconciles clean
        // against its seed balance; a transfer targeting it is rejected
        // below with SystemWalletForbidden instead.
        if to_wallet_id != system_wallet.id {
            self.ensure_reconciled(to_wallet_id).await?;
        }

        self.ensure_unused_reference(reference).await?;
        let out_reference = format!("{}-OUT", reference);
        self.ensure_unused_reference(&out_reference).await?;

        let from_wallet = self.get_wallet(from_wallet_id).await?;
        if !from_wallet.is_active() {
            return Err(WalletEngineError::WalletInactive);
        }
        if from_wallet.balance < amount {
            return Err(WalletEngineError::InsufficientFunds {
                available: from_wallet.balance,
                requested: amount,
            });
        }

        let to_wallet = match self.db.get_wallet(to_wallet_id).await? {
            Some(wallet) if wallet.is_active() => wallet,
            _ => return Err(WalletEngineError::DestinationInactive),
        };
        if to_wallet.id == system_wallet.id {
            return Err(WalletEngineError::SystemWalletForbidden);
        }

        let from_before = from_wallet.balance;
        let from_after = from_before - amount;
        let to_before = to_wallet.balance;
        let to_after = to_before + amount;

        let out_entry = NewEntry {
            reference: out_reference,
            wallet_id: from_wallet_id,
            direction: EntryDirection::Debit,
            purpose: EntryPurpose::Transfer,
            amount,
            balance_before: from_before,
            balance_after: from_after,
            description: format!("Transfer to wallet {}: {}", to_wallet_id, description),
            metadata: r#"{"source": "transfer"}"#.to_string(),
            status: EntryStatus::Completed,
            related_entry_id: None,
        };

        let in_entry = NewEntry {
            reference: format!("{}-IN", reference),
            wallet_id: to_wallet_id,
            direction: EntryDirection::Credit,
            purpose: EntryPurpose::Transfer,
            amount,
            balance_before: to_before,
            balance_after: to_after,
            description: format!("Transfer from wallet {}: {}", from_wallet_id, description),
            metadata: r#"{"source": "transfer"}"#.to_string(),
            status: EntryStatus::Completed,
            related_entry_id: None,
        };

        let (out_entry, in_entry) = self
            .db
            .execute_posting(
                out_entry,
                BalanceUpdate {
                    wallet_id: from_wallet_id,
                    new_balance: from_after,
                    expected_version: from_wallet.version,
                },
                in_entry,
                BalanceUpdate {
                    wallet_id: to_wallet_id,
                    new_balance: to_after,
                    expected_version: to_wallet.version,
                },
            )
            .await?;

        metrics::POSTINGS_COMMITTED
            .with_label_values(&["TRANSFER"])
            .inc();
        info!(
            from_wallet_id,
            to_wallet_id,
            %amount,
            reference,
            "Funds transferred"
        );

        self.spawn_post_posting_audit(vec![from_wallet_id, to_wallet_id]);

        Ok((out_entry, in_entry))
    }

    /// Cursor-paginated listing of a wallet's entries, newest first. Fetches
    /// one row past the requested page to decide whether a next cursor
    /// exists.
    pub async fn transaction_history(
        &self,
        wallet_id: i64,
        cursor: Option<&str>,
        limit: i64,
    ) -> Result<(Vec<Entry>, Option<String>)> {
        self.get_wallet(wallet_id).await?;

        let (cursor_time, cursor_id) = match cursor {
            Some(raw) if !raw.is_empty() => {
                let decoded = decode_cursor(raw)?;
                (Some(decoded.created_at), Some(decoded.id))
            }
            _ => (None, None),
        };

        let mut entries = self
            .db
            .list_entries_by_wallet(wallet_id, cursor_time, cursor_id, limit + 1)
            .await?;

        let has_more = entries.len() as i64 > limit;
        if has_more {
            entries.truncate(limit as usize);
        }

        let next_cursor = if has_more {
            match entries.last() {
                Some(last) => Some(encode_cursor(&EntryCursor {
                    id: last.id,
                    created_at: last.created_at,
                })?),
                None => None,
            }
        } else {
            None
        };

        Ok((entries, next_cursor))
    }

    /// Pre-posting reconciliation gate: a wallet whose stored balance has
    /// drifted from its ledger must not take further postings until an
    /// operator resolves the mismatch.
    async fn ensure_reconciled(&self, wallet_id: i64) -> Result<()> {
        let report = self.reconciliation.reconcile_wallet(wallet_id).await?;

        if report.has_mismatch() {
            return Err(WalletEngineError::ReconciliationBlocked {
                stored: report.stored_balance,
                calculated: report.calculated_balance,
                difference: report.difference,
            });
        }

        Ok(())
    }

    async fn ensure_unused_reference(&self, reference: &str) -> Result<()> {
        if self.db.get_entry_by_reference(reference).await?.is_some() {
            return Err(WalletEngineError::DuplicateReference(reference.to_string()));
        }
        Ok(())
    }

    /// Audit reconciliation after a committed posting. Fire-and-forget:
    /// failures are logged and never reach the caller's response path.
    fn spawn_post_posting_audit(&self, wallet_ids: Vec<i64>) {
        let reconciliation = Arc::clone(&self.reconciliation);

        tokio::spawn(async move {
            for wallet_id in wallet_ids {
                match reconciliation.reconcile_wallet(wallet_id).await {
                    Ok(report) if report.has_mismatch() => {
                        warn!(
                            wallet_id,
                            notes = %report.notes,
                            "Post-posting reconciliation mismatch"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(wallet_id, "Post-posting reconciliation failed: {}", e);
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cursor_round_trip() {
        let cursor = EntryCursor {
            id: 42,
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 45).unwrap(),
        };

        let encoded = encode_cursor(&cursor).unwrap();
        let decoded = decode_cursor(&encoded).unwrap();

        assert_eq!(decoded, cursor);
    }

    #[test]
    fn test_cursor_json_shape() {
        let cursor = EntryCursor {
            id: 7,
            created_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        };

        let encoded = encode_cursor(&cursor).unwrap();
        let json = String::from_utf8(BASE64.decode(encoded).unwrap()).unwrap();

        assert!(json.contains("\"id\":7"));
        assert!(json.contains("\"created_at\":\"2024-01-02T03:04:05Z\""));
    }

    #[test]
    fn test_cursor_rejects_bad_base64() {
        let err = decode_cursor("not base64!!!").unwrap_err();
        assert!(matches!(err, WalletEngineError::InvalidCursor));
    }

    #[test]
    fn test_cursor_rejects_bad_json() {
        let encoded = BASE64.encode(b"{\"id\": oops}");
        let err = decode_cursor(&encoded).unwrap_err();
        assert!(matches!(err, WalletEngineError::InvalidCursor));
    }

    #[test]
    fn test_cursor_accepts_standard_padding() {
        let cursor = EntryCursor {
            id: 1,
            created_at: Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap(),
        };
        let encoded = encode_cursor(&cursor).unwrap();

        // STANDARD alphabet with padding, as produced by the encoder.
        assert!(encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '='));
        assert!(decode_cursor(&encoded).is_ok());
    }
}
