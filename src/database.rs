use crate::errors::{Result, WalletEngineError};
use crate::models::{
    BalanceUpdate, Entry, EntryDirection, EntryStatus, NewEntry, ReconciliationReport,
    ReconciliationStatus, User, Wallet, SYSTEM_ACCOUNT_EMAIL, SYSTEM_ACCOUNT_NAME,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        Ok(Database { pool })
    }

    /// Wrap an existing pool, e.g. one handed out by `#[sqlx::test]`.
    pub fn from_pool(pool: PgPool) -> Self {
        Database { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| WalletEngineError::Internal(format!("migration failed: {}", e)))
    }

    // ========== Wallets ==========

    pub async fn create_wallet(&self, user_id: i64, currency: &str) -> Result<Wallet> {
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            INSERT INTO wallets (user_id, currency, status)
            VALUES ($1, $2, 'ACTIVE')
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(currency)
        .fetch_one(&self.pool)
        .await?;

        Ok(wallet)
    }

    pub async fn get_wallet(&self, wallet_id: i64) -> Result<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE id = $1")
            .bind(wallet_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(wallet)
    }

    pub async fn get_wallet_by_user(&self, user_id: i64) -> Result<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(wallet)
    }

    /// The singleton issuer wallet used as counterparty for funding and
    /// withdrawal.
    pub async fn get_system_wallet(&self) -> Result<Wallet> {
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT w.* FROM wallets w
            JOIN users u ON u.id = w.user_id
            WHERE u.is_system = TRUE
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        wallet.ok_or_else(|| WalletEngineError::NotFound("system wallet".to_string()))
    }

    pub async fn list_wallets_for_reconciliation(&self) -> Result<Vec<Wallet>> {
        let wallets = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(wallets)
    }

    /// Optimistic balance update: succeeds only while the wallet row still
    /// carries `expected_version`, bumping the version by one. Zero rows
    /// affected signals a lost race.
    pub async fn compare_and_update_balance(&self, update: &BalanceUpdate) -> Result<()> {
        cas_wallet_balance(&self.pool, update).await
    }

    // ========== Entries ==========

    pub async fn get_entry(&self, entry_id: i64) -> Result<Option<Entry>> {
        let entry = sqlx::query_as::<_, Entry>("SELECT * FROM entries WHERE id = $1")
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(entry)
    }

    pub async fn get_entry_by_reference(&self, reference: &str) -> Result<Option<Entry>> {
        let entry = sqlx::query_as::<_, Entry>("SELECT * FROM entries WHERE reference = $1")
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;

        Ok(entry)
    }

    /// Cursor page over one wallet's entries, newest first. The filter is a
    /// strict row-value comparison on (created_at, id) so pages stay stable
    /// while new entries arrive at the head. Callers pass `limit + 1` to
    /// detect a next page.
    pub async fn list_entries_by_wallet(
        &self,
        wallet_id: i64,
        cursor_time: Option<DateTime<Utc>>,
        cursor_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Entry>> {
        let entries = sqlx::query_as::<_, Entry>(
            r#"
            SELECT * FROM entries
            WHERE wallet_id = $1
              AND ($2::TIMESTAMPTZ IS NULL OR (created_at, id) < ($2, $3))
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            "#,
        )
        .bind(wallet_id)
        .bind(cursor_time)
        .bind(cursor_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    pub async fn sum_completed_credits(&self, wallet_id: i64) -> Result<Decimal> {
        self.sum_completed(wallet_id, EntryDirection::Credit).await
    }

    pub async fn sum_completed_debits(&self, wallet_id: i64) -> Result<Decimal> {
        self.sum_completed(wallet_id, EntryDirection::Debit).await
    }

    async fn sum_completed(&self, wallet_id: i64, direction: EntryDirection) -> Result<Decimal> {
        let (sum,): (Decimal,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM entries
            WHERE wallet_id = $1 AND status = $2 AND direction = $3
            "#,
        )
        .bind(wallet_id)
        .bind(EntryStatus::Completed)
        .bind(direction)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }

    /// Atomic double-entry posting. Executes, in order and inside a single
    /// transaction: insert the counterparty entry, CAS its wallet balance,
    /// insert the user entry linked to the counterparty, CAS the user wallet
    /// balance, then back-link the counterparty entry. Any failure rolls the
    /// whole unit back; a failed CAS surfaces as ConcurrentModification.
    pub async fn execute_posting(
        &self,
        first: NewEntry,
        first_update: BalanceUpdate,
        mut second: NewEntry,
        second_update: BalanceUpdate,
    ) -> Result<(Entry, Entry)> {
        let mut tx = self.pool.begin().await?;

        let first_entry = insert_entry(&mut *tx, &first).await?;
        cas_wallet_balance(&mut *tx, &first_update).await?;

        second.related_entry_id = Some(first_entry.id);
        let second_entry = insert_entry(&mut *tx, &second).await?;
        cas_wallet_balance(&mut *tx, &second_update).await?;

        let first_entry = link_related_entry(&mut *tx, first_entry.id, second_entry.id).await?;

        tx.commit().await?;

        Ok((first_entry, second_entry))
    }

    // ========== Reconciliation reports ==========

    pub async fn insert_report(
        &self,
        wallet_id: i64,
        stored_balance: Decimal,
        calculated_balance: Decimal,
        difference: Decimal,
        status: ReconciliationStatus,
        notes: &str,
    ) -> Result<ReconciliationReport> {
        let report = sqlx::query_as::<_, ReconciliationReport>(
            r#"
            INSERT INTO reconciliation_reports
                (wallet_id, stored_balance, calculated_balance, difference, status, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(wallet_id)
        .bind(stored_balance)
        .bind(calculated_balance)
        .bind(difference)
        .bind(status)
        .bind(notes)
        .fetch_one(&self.pool)
        .await?;

        Ok(report)
    }

    pub async fn list_reports(&self, offset: i64, limit: i64) -> Result<Vec<ReconciliationReport>> {
        let reports = sqlx::query_as::<_, ReconciliationReport>(
            r#"
            SELECT * FROM reconciliation_reports
            ORDER BY created_at DESC, id DESC
            OFFSET $1 LIMIT $2
            "#,
        )
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(reports)
    }

    pub async fn list_mismatch_reports(
        &self,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ReconciliationReport>> {
        let reports = sqlx::query_as::<_, ReconciliationReport>(
            r#"
            SELECT * FROM reconciliation_reports
            WHERE status = $1
            ORDER BY created_at DESC, id DESC
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(ReconciliationStatus::Mismatch)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(reports)
    }

    pub async fn list_reports_by_wallet(
        &self,
        wallet_id: i64,
    ) -> Result<Vec<ReconciliationReport>> {
        let reports = sqlx::query_as::<_, ReconciliationReport>(
            r#"
            SELECT * FROM reconciliation_reports
            WHERE wallet_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(wallet_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(reports)
    }

    // ========== Users ==========

    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Creates the user and their single zero-balance wallet in one
    /// transaction.
    pub async fn create_user_with_wallet(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        currency: &str,
    ) -> Result<(User, Wallet)> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await?;

        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            INSERT INTO wallets (user_id, currency, status)
            VALUES ($1, $2, 'ACTIVE')
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(currency)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((user, wallet))
    }

    /// Idempotent creation of the system account and its seeded issuer
    /// wallet. Runs once at startup.
    pub async fn bootstrap_system_account(
        &self,
        seed_balance: Decimal,
        currency: &str,
    ) -> Result<Wallet> {
        let existing = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT w.* FROM wallets w
            JOIN users u ON u.id = w.user_id
            WHERE u.is_system = TRUE
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        if let Some(wallet) = existing {
            info!(wallet_id = wallet.id, "System wallet already exists");
            return Ok(wallet);
        }

        let password_hash = crate::users::hash_password("system-account-password")?;

        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash, is_system)
            VALUES ($1, $2, $3, TRUE)
            RETURNING *
            "#,
        )
        .bind(SYSTEM_ACCOUNT_NAME)
        .bind(SYSTEM_ACCOUNT_EMAIL)
        .bind(&password_hash)
        .fetch_one(&mut *tx)
        .await?;

        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            INSERT INTO wallets (user_id, balance, currency, status)
            VALUES ($1, $2, $3, 'ACTIVE')
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(seed_balance)
        .bind(currency)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            user_id = user.id,
            wallet_id = wallet.id,
            seed_balance = %seed_balance,
            "System account bootstrapped"
        );

        Ok(wallet)
    }
}

async fn insert_entry<'e, E>(executor: E, entry: &NewEntry) -> Result<Entry>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let row = sqlx::query_as::<_, Entry>(
        r#"
        INSERT INTO entries
            (reference, wallet_id, direction, purpose, amount,
             balance_before, balance_after, description, metadata, status,
             related_entry_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(&entry.reference)
    .bind(entry.wallet_id)
    .bind(entry.direction)
    .bind(entry.purpose)
    .bind(entry.amount)
    .bind(entry.balance_before)
    .bind(entry.balance_after)
    .bind(&entry.description)
    .bind(&entry.metadata)
    .bind(entry.status)
    .bind(entry.related_entry_id)
    .fetch_one(executor)
    .await?;

    Ok(row)
}

async fn cas_wallet_balance<'e, E>(executor: E, update: &BalanceUpdate) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE wallets
        SET balance = $1, version = version + 1, updated_at = NOW()
        WHERE id = $2 AND version = $3
        "#,
    )
    .bind(update.new_balance)
    .bind(update.wallet_id)
    .bind(update.expected_version)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(WalletEngineError::ConcurrentModification);
    }

    Ok(())
}

async fn link_related_entry<'e, E>(executor: E, entry_id: i64, related_id: i64) -> Result<Entry>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let entry = sqlx::query_as::<_, Entry>(
        r#"
        UPDATE entries
        SET related_entry_id = $1, updated_at = NOW()
        WHERE id = $2
        RETURNING *
        "#,
    )
    .bind(related_id)
    .bind(entry_id)
    .fetch_one(executor)
    .await?;

    Ok(entry)
}
