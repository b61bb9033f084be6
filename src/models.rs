use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Wallet status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletStatus {
    Active,
    Suspended,
    Closed,
}

/// Direction of a ledger entry. CREDIT increases the wallet balance,
/// DEBIT decreases it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryDirection {
    Credit,
    Debit,
}

/// Business purpose of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryPurpose {
    WalletTopUp,
    Withdrawal,
    Transfer,
}

/// Lifecycle status of a ledger entry. Only COMPLETED entries contribute
/// to the calculated balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    Match,
    Mismatch,
    DoubleEntryError,
}

impl ReconciliationStatus {
    /// Severity level for alerting consumers.
    pub fn severity(&self) -> &'static str {
        match self {
            ReconciliationStatus::Match => "INFO",
            ReconciliationStatus::Mismatch => "WARNING",
            ReconciliationStatus::DoubleEntryError => "CRITICAL",
        }
    }
}

/// A user's wallet. The balance column is a cached projection of the
/// completed ledger entries; `version` guards every balance mutation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Wallet {
    pub id: i64,
    pub user_id: i64,
    pub balance: Decimal,
    pub currency: String,
    pub status: WalletStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn is_active(&self) -> bool {
        self.status == WalletStatus::Active
    }

    pub fn can_debit(&self, amount: Decimal) -> bool {
        self.is_active() && self.balance >= amount
    }
}

/// An atomic ledger record affecting exactly one wallet. Every posting
/// produces two of these, linked bidirectionally via `related_entry_id`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Entry {
    pub id: i64,
    pub reference: String,
    pub wallet_id: i64,
    pub direction: EntryDirection,
    pub purpose: EntryPurpose,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub description: String,
    /// Opaque JSON string; stored and returned, never parsed.
    pub metadata: String,
    pub status: EntryStatus,
    pub related_entry_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entry {
    pub fn is_completed(&self) -> bool {
        self.status == EntryStatus::Completed
    }

    /// Balance delta this entry applies to its wallet, signed by direction.
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            EntryDirection::Credit => self.amount,
            EntryDirection::Debit => -self.amount,
        }
    }
}

/// Insert payload for a ledger entry; ids and timestamps are assigned by
/// the store.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub reference: String,
    pub wallet_id: i64,
    pub direction: EntryDirection,
    pub purpose: EntryPurpose,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub description: String,
    pub metadata: String,
    pub status: EntryStatus,
    pub related_entry_id: Option<i64>,
}

/// Compare-and-swap balance update against a pre-read wallet version.
#[derive(Debug, Clone, Copy)]
pub struct BalanceUpdate {
    pub wallet_id: i64,
    pub new_balance: Decimal,
    pub expected_version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReconciliationReport {
    pub id: i64,
    pub wallet_id: i64,
    pub stored_balance: Decimal,
    pub calculated_balance: Decimal,
    pub difference: Decimal,
    pub status: ReconciliationStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn has_mismatch(&self) -> bool {
        self.status == ReconciliationStatus::Mismatch
    }
}

pub const SYSTEM_ACCOUNT_EMAIL: &str = "system@wallet.internal";
pub const SYSTEM_ACCOUNT_NAME: &str = "System Account";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User registration request
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 2, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6))]
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Wallet funding request
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct FundWalletRequest {
    pub amount: Decimal,
    #[validate(length(min = 1, max = 255))]
    pub reference: String,
    #[serde(default)]
    pub description: String,
}

/// Withdrawal request
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct WithdrawRequest {
    pub amount: Decimal,
    #[validate(length(min = 1, max = 255))]
    pub reference: String,
    #[serde(default)]
    pub description: String,
}

/// Wallet-to-wallet transfer request
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct TransferRequest {
    pub to_wallet_id: i64,
    pub amount: Decimal,
    #[validate(length(min = 1, max = 255))]
    pub reference: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        UserResponse {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub wallet_id: i64,
    pub balance: Decimal,
    pub currency: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry(direction: EntryDirection, amount: Decimal) -> Entry {
        Entry {
            id: 1,
            reference: "REF1".into(),
            wallet_id: 1,
            direction,
            purpose: EntryPurpose::WalletTopUp,
            amount,
            balance_before: dec!(100.00),
            balance_after: dec!(150.00),
            description: String::new(),
            metadata: "{}".into(),
            status: EntryStatus::Completed,
            related_entry_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_signed_amount_by_direction() {
        assert_eq!(
            entry(EntryDirection::Credit, dec!(50.00)).signed_amount(),
            dec!(50.00)
        );
        assert_eq!(
            entry(EntryDirection::Debit, dec!(50.00)).signed_amount(),
            dec!(-50.00)
        );
    }

    #[test]
    fn test_wallet_can_debit() {
        let wallet = Wallet {
            id: 1,
            user_id: 1,
            balance: dec!(100.00),
            currency: "USD".into(),
            status: WalletStatus::Active,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(wallet.can_debit(dec!(100.00)));
        assert!(!wallet.can_debit(dec!(100.01)));

        let suspended = Wallet {
            status: WalletStatus::Suspended,
            ..wallet
        };
        assert!(!suspended.can_debit(dec!(1.00)));
    }

    #[test]
    fn test_reconciliation_severity_mapping() {
        assert_eq!(ReconciliationStatus::Match.severity(), "INFO");
        assert_eq!(ReconciliationStatus::Mismatch.severity(), "WARNING");
        assert_eq!(ReconciliationStatus::DoubleEntryError.severity(), "CRITICAL");
    }

    #[test]
    fn test_enum_wire_format() {
        assert_eq!(
            serde_json::to_string(&EntryPurpose::WalletTopUp).unwrap(),
            "\"WALLET_TOP_UP\""
        );
        assert_eq!(
            serde_json::to_string(&ReconciliationStatus::DoubleEntryError).unwrap(),
            "\"DOUBLE_ENTRY_ERROR\""
        );
        assert_eq!(
            serde_json::to_string(&WalletStatus::Active).unwrap(),
            "\"ACTIVE\""
        );
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let user = User {
            id: 1,
            name: "Jane".into(),
            email: "jane@example.com".into(),
            password_hash: "secret-hash".into(),
            is_system: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(!json.contains("password_hash"));
    }
}
