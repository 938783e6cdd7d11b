//! Database persistence for accounts, positions, sessions, and the ledger.
//!
//! Monetary and price values are stored as scaled integers (cents for
//! currency, 1e-8 units for prices and quantities) so that relative delta
//! updates composed in SQL stay exact. Row structs mirror the tables and
//! convert to domain models at the boundary.

mod accountant;
mod locks;

pub use accountant::{CloseReceipt, CloseRequest, LedgerAccountant, OpenRecord};
pub use locks::{AccountGuard, AccountLocks};

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::config::Tier;
use crate::error::{EngineError, Result};
use crate::models::{
    Account, LedgerEntry, LedgerKind, LedgerStatus, Position, PositionState, Session, Side,
    MONEY_SCALE, PRICE_SCALE,
};

// ==================== Scaled-integer and time codecs ====================

/// Encode a decimal as a scaled integer column value. Inputs are quantized
/// before storage, so the truncation here never loses information.
fn to_scaled(value: Decimal, scale: u32) -> i64 {
    let mut v = value.trunc_with_scale(scale);
    v.rescale(scale);
    v.mantissa() as i64
}

fn from_scaled(raw: i64, scale: u32) -> Decimal {
    Decimal::new(raw, scale)
}

fn to_money(value: Decimal) -> i64 {
    to_scaled(value, MONEY_SCALE)
}

fn from_money(raw: i64) -> Decimal {
    from_scaled(raw, MONEY_SCALE)
}

fn to_price(value: Decimal) -> i64 {
    to_scaled(value, PRICE_SCALE)
}

fn from_price(raw: i64) -> Decimal {
    from_scaled(raw, PRICE_SCALE)
}

pub(crate) fn fmt_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(field: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| EngineError::Decode(format!("bad timestamp in {field}: {e}")))
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid> {
    Uuid::from_str(value).map_err(|e| EngineError::Decode(format!("bad uuid in {field}: {e}")))
}

// ==================== Stored rows ====================

/// Account row as stored. The tier stays a string here so that one
/// account with a corrupt tier fails on conversion, not on list queries.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredAccount {
    pub id: String,
    pub email: String,
    pub balance: i64,
    pub initial_balance: i64,
    pub tier: String,
    pub bot_enabled: bool,
    pub is_active: bool,
    pub created_at: String,
}

impl StoredAccount {
    pub fn into_model(self) -> Result<Account> {
        let tier = match self.tier.as_str() {
            "none" => None,
            other => Some(other.parse::<Tier>()?),
        };
        Ok(Account {
            id: parse_uuid("accounts.id", &self.id)?,
            email: self.email,
            balance: from_money(self.balance),
            initial_balance: from_money(self.initial_balance),
            tier,
            bot_enabled: self.bot_enabled,
            is_active: self.is_active,
            created_at: parse_time("accounts.created_at", &self.created_at)?,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredPosition {
    pub id: String,
    pub account_id: String,
    pub symbol: String,
    pub side: String,
    pub entry_price: i64,
    pub exit_price: Option<i64>,
    pub quantity: i64,
    pub profit_loss: i64,
    pub profit_loss_percent: i64,
    pub is_open: bool,
    pub opened_at: String,
    pub closed_at: Option<String>,
}

impl StoredPosition {
    pub fn into_model(self) -> Result<Position> {
        Ok(Position {
            id: parse_uuid("bot_trades.id", &self.id)?,
            account_id: parse_uuid("bot_trades.account_id", &self.account_id)?,
            symbol: self.symbol,
            side: Side::parse(&self.side)?,
            entry_price: from_price(self.entry_price),
            exit_price: self.exit_price.map(from_price),
            quantity: from_price(self.quantity),
            profit_loss: from_money(self.profit_loss),
            profit_loss_percent: from_money(self.profit_loss_percent),
            state: if self.is_open {
                PositionState::Open
            } else {
                PositionState::Closed
            },
            opened_at: parse_time("bot_trades.opened_at", &self.opened_at)?,
            closed_at: self
                .closed_at
                .as_deref()
                .map(|t| parse_time("bot_trades.closed_at", t))
                .transpose()?,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredSession {
    pub id: String,
    pub account_id: String,
    pub tier: String,
    pub starting_balance: i64,
    pub current_balance: i64,
    pub total_profit: i64,
    pub total_trades: i64,
    pub winning_trades: i64,
    pub is_active: bool,
    pub started_at: String,
    pub ended_at: Option<String>,
}

impl StoredSession {
    pub fn into_model(self) -> Result<Session> {
        Ok(Session {
            id: parse_uuid("trading_sessions.id", &self.id)?,
            account_id: parse_uuid("trading_sessions.account_id", &self.account_id)?,
            tier: self.tier.parse::<Tier>()?,
            starting_balance: from_money(self.starting_balance),
            current_balance: from_money(self.current_balance),
            total_profit: from_money(self.total_profit),
            total_trades: self.total_trades,
            winning_trades: self.winning_trades,
            is_active: self.is_active,
            started_at: parse_time("trading_sessions.started_at", &self.started_at)?,
            ended_at: self
                .ended_at
                .as_deref()
                .map(|t| parse_time("trading_sessions.ended_at", t))
                .transpose()?,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredLedgerEntry {
    pub id: String,
    pub account_id: String,
    pub kind: String,
    pub amount: i64,
    pub status: String,
    pub created_at: String,
    pub processed_at: Option<String>,
}

impl StoredLedgerEntry {
    pub fn into_model(self) -> Result<LedgerEntry> {
        Ok(LedgerEntry {
            id: parse_uuid("transactions.id", &self.id)?,
            account_id: parse_uuid("transactions.account_id", &self.account_id)?,
            kind: LedgerKind::parse(&self.kind)?,
            amount: from_money(self.amount),
            status: LedgerStatus::parse(&self.status)?,
            created_at: parse_time("transactions.created_at", &self.created_at)?,
            processed_at: self
                .processed_at
                .as_deref()
                .map(|t| parse_time("transactions.processed_at", t))
                .transpose()?,
        })
    }
}

// ==================== Database ====================

/// SQLite connection pool plus migrations.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect and migrate.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// In-memory database on a single connection (tests and offline runs).
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                balance INTEGER NOT NULL DEFAULT 0,
                initial_balance INTEGER NOT NULL DEFAULT 0,
                tier TEXT NOT NULL DEFAULT 'none',
                bot_enabled INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trading_sessions (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL REFERENCES accounts(id),
                tier TEXT NOT NULL,
                starting_balance INTEGER NOT NULL,
                current_balance INTEGER NOT NULL,
                total_profit INTEGER NOT NULL DEFAULT 0,
                total_trades INTEGER NOT NULL DEFAULT 0,
                winning_trades INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                started_at TEXT NOT NULL,
                ended_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bot_trades (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL REFERENCES accounts(id),
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_price INTEGER NOT NULL,
                exit_price INTEGER,
                quantity INTEGER NOT NULL,
                profit_loss INTEGER NOT NULL DEFAULT 0,
                profit_loss_percent INTEGER NOT NULL DEFAULT 0,
                is_open INTEGER NOT NULL DEFAULT 1,
                opened_at TEXT NOT NULL,
                closed_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL REFERENCES accounts(id),
                kind TEXT NOT NULL,
                amount INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                processed_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Indexes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_account_open ON bot_trades(account_id, is_open)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_symbol_opened ON bot_trades(symbol, opened_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_account_active ON trading_sessions(account_id, is_active)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tx_account_status ON transactions(account_id, status)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ==================== Accounts ====================

    /// Create an account. The initial balance seeds ledger reconstruction.
    pub async fn create_account(
        &self,
        email: &str,
        initial_balance: Decimal,
        tier: Option<Tier>,
        bot_enabled: bool,
    ) -> Result<Account> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let tier_str = tier.map(|t| t.as_str()).unwrap_or("none");

        sqlx::query(
            r#"
            INSERT INTO accounts (id, email, balance, initial_balance, tier, bot_enabled, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(email)
        .bind(to_money(initial_balance))
        .bind(to_money(initial_balance))
        .bind(tier_str)
        .bind(bot_enabled)
        .bind(fmt_time(now))
        .execute(&self.pool)
        .await?;

        self.get_account(id).await
    }

    pub async fn get_account(&self, id: Uuid) -> Result<Account> {
        let row = sqlx::query_as::<_, StoredAccount>("SELECT * FROM accounts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(EngineError::AccountNotFound(id))?;
        row.into_model()
    }

    /// Accounts the simulation should pick up. Rows are returned raw so a
    /// corrupt tier on one account fails in that account's unit of work,
    /// not here.
    pub async fn simulatable_accounts(&self) -> Result<Vec<StoredAccount>> {
        let rows = sqlx::query_as::<_, StoredAccount>(
            "SELECT * FROM accounts WHERE is_active = 1 AND bot_enabled = 1 ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ==================== Positions ====================

    pub async fn get_position(&self, id: Uuid) -> Result<Position> {
        let row = sqlx::query_as::<_, StoredPosition>("SELECT * FROM bot_trades WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        row.into_model()
    }

    pub async fn open_positions(&self, account_id: Uuid) -> Result<Vec<Position>> {
        let rows = sqlx::query_as::<_, StoredPosition>(
            "SELECT * FROM bot_trades WHERE account_id = ? AND is_open = 1 ORDER BY opened_at",
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StoredPosition::into_model).collect()
    }

    pub async fn count_open_positions(&self, account_id: Uuid) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM bot_trades WHERE account_id = ? AND is_open = 1",
        )
        .bind(account_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn positions_for_account(&self, account_id: Uuid) -> Result<Vec<Position>> {
        let rows = sqlx::query_as::<_, StoredPosition>(
            "SELECT * FROM bot_trades WHERE account_id = ? ORDER BY opened_at DESC",
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StoredPosition::into_model).collect()
    }

    // ==================== Sessions ====================

    pub async fn active_session(&self, account_id: Uuid) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, StoredSession>(
            "SELECT * FROM trading_sessions WHERE account_id = ? AND is_active = 1",
        )
        .bind(account_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(StoredSession::into_model).transpose()
    }

    // ==================== Ledger ====================

    pub async fn ledger_entries(&self, account_id: Uuid) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, StoredLedgerEntry>(
            "SELECT * FROM transactions WHERE account_id = ? ORDER BY created_at",
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StoredLedgerEntry::into_model).collect()
    }

    pub async fn get_ledger_entry(&self, id: Uuid) -> Result<LedgerEntry> {
        let row =
            sqlx::query_as::<_, StoredLedgerEntry>("SELECT * FROM transactions WHERE id = ?")
                .bind(id.to_string())
                .fetch_one(&self.pool)
                .await?;
        row.into_model()
    }

    /// Rebuild the balance from the ledger: initial balance plus the sum
    /// of signed completed entries. The source of truth for reconciliation.
    pub async fn reconstruct_balance(&self, account_id: Uuid) -> Result<Decimal> {
        let account = self.get_account(account_id).await?;
        let entries = self.ledger_entries(account_id).await?;

        let total: Decimal = entries.iter().map(LedgerEntry::signed_amount).sum();
        Ok(account.initial_balance + total)
    }
}

// ==================== Transaction-scoped operations ====================
//
// These run inside an open transaction while the caller holds the account
// guard. Re-reading rows here defends against stale in-memory snapshots.

pub(crate) async fn tx_fetch_account(
    conn: &mut SqliteConnection,
    account_id: Uuid,
) -> Result<Account> {
    let row = sqlx::query_as::<_, StoredAccount>("SELECT * FROM accounts WHERE id = ?")
        .bind(account_id.to_string())
        .fetch_optional(conn)
        .await?
        .ok_or(EngineError::AccountNotFound(account_id))?;
    row.into_model()
}

pub(crate) async fn tx_fetch_active_session(
    conn: &mut SqliteConnection,
    account_id: Uuid,
) -> Result<Option<Session>> {
    let row = sqlx::query_as::<_, StoredSession>(
        "SELECT * FROM trading_sessions WHERE account_id = ? AND is_active = 1",
    )
    .bind(account_id.to_string())
    .fetch_optional(conn)
    .await?;
    row.map(StoredSession::into_model).transpose()
}

pub(crate) async fn tx_fetch_position(
    conn: &mut SqliteConnection,
    position_id: Uuid,
) -> Result<Option<Position>> {
    let row = sqlx::query_as::<_, StoredPosition>("SELECT * FROM bot_trades WHERE id = ?")
        .bind(position_id.to_string())
        .fetch_optional(conn)
        .await?;
    row.map(StoredPosition::into_model).transpose()
}

pub(crate) async fn tx_fetch_ledger_entry(
    conn: &mut SqliteConnection,
    entry_id: Uuid,
) -> Result<Option<LedgerEntry>> {
    let row = sqlx::query_as::<_, StoredLedgerEntry>("SELECT * FROM transactions WHERE id = ?")
        .bind(entry_id.to_string())
        .fetch_optional(conn)
        .await?;
    row.map(StoredLedgerEntry::into_model).transpose()
}

pub(crate) async fn tx_count_open_positions(
    conn: &mut SqliteConnection,
    account_id: Uuid,
) -> Result<i64> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM bot_trades WHERE account_id = ? AND is_open = 1")
            .bind(account_id.to_string())
            .fetch_one(conn)
            .await?;
    Ok(count)
}

pub(crate) async fn tx_insert_position(
    conn: &mut SqliteConnection,
    position: &Position,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO bot_trades
            (id, account_id, symbol, side, entry_price, exit_price, quantity,
             profit_loss, profit_loss_percent, is_open, opened_at, closed_at)
        VALUES (?, ?, ?, ?, ?, NULL, ?, 0, 0, 1, ?, NULL)
        "#,
    )
    .bind(position.id.to_string())
    .bind(position.account_id.to_string())
    .bind(&position.symbol)
    .bind(position.side.as_str())
    .bind(to_price(position.entry_price))
    .bind(to_price(position.quantity))
    .bind(fmt_time(position.opened_at))
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn tx_close_position(
    conn: &mut SqliteConnection,
    position_id: Uuid,
    exit_price: Decimal,
    profit_loss: Decimal,
    profit_loss_percent: Decimal,
    closed_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE bot_trades SET
            exit_price = ?,
            profit_loss = ?,
            profit_loss_percent = ?,
            is_open = 0,
            closed_at = ?
        WHERE id = ?
        "#,
    )
    .bind(to_price(exit_price))
    .bind(to_money(profit_loss))
    .bind(to_money(profit_loss_percent))
    .bind(fmt_time(closed_at))
    .bind(position_id.to_string())
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn tx_insert_session(
    conn: &mut SqliteConnection,
    session: &Session,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO trading_sessions
            (id, account_id, tier, starting_balance, current_balance,
             total_profit, total_trades, winning_trades, is_active, started_at, ended_at)
        VALUES (?, ?, ?, ?, ?, 0, 0, 0, 1, ?, NULL)
        "#,
    )
    .bind(session.id.to_string())
    .bind(session.account_id.to_string())
    .bind(session.tier.as_str())
    .bind(to_money(session.starting_balance))
    .bind(to_money(session.current_balance))
    .bind(fmt_time(session.started_at))
    .execute(conn)
    .await?;
    Ok(())
}

/// Relative updates only: concurrent touches to unrelated counters on the
/// same session row compose correctly.
pub(crate) async fn tx_bump_session(
    conn: &mut SqliteConnection,
    session_id: Uuid,
    trades_delta: i64,
    winning_delta: i64,
    profit_delta: Decimal,
    balance_delta: Decimal,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE trading_sessions SET
            total_trades = total_trades + ?,
            winning_trades = winning_trades + ?,
            total_profit = total_profit + ?,
            current_balance = current_balance + ?
        WHERE id = ?
        "#,
    )
    .bind(trades_delta)
    .bind(winning_delta)
    .bind(to_money(profit_delta))
    .bind(to_money(balance_delta))
    .bind(session_id.to_string())
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn tx_end_session(
    conn: &mut SqliteConnection,
    session_id: Uuid,
    ended_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE trading_sessions SET is_active = 0, ended_at = ? WHERE id = ?")
        .bind(fmt_time(ended_at))
        .bind(session_id.to_string())
        .execute(conn)
        .await?;
    Ok(())
}

pub(crate) async fn tx_insert_ledger_entry(
    conn: &mut SqliteConnection,
    entry: &LedgerEntry,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO transactions (id, account_id, kind, amount, status, created_at, processed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.id.to_string())
    .bind(entry.account_id.to_string())
    .bind(entry.kind.as_str())
    .bind(to_money(entry.amount))
    .bind(entry.status.as_str())
    .bind(fmt_time(entry.created_at))
    .bind(entry.processed_at.map(fmt_time))
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn tx_settle_ledger_entry(
    conn: &mut SqliteConnection,
    entry_id: Uuid,
    status: LedgerStatus,
    processed_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE transactions SET status = ?, processed_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(fmt_time(processed_at))
        .bind(entry_id.to_string())
        .execute(conn)
        .await?;
    Ok(())
}

pub(crate) async fn tx_apply_balance_delta(
    conn: &mut SqliteConnection,
    account_id: Uuid,
    delta: Decimal,
) -> Result<()> {
    sqlx::query("UPDATE accounts SET balance = balance + ? WHERE id = ?")
        .bind(to_money(delta))
        .bind(account_id.to_string())
        .execute(conn)
        .await?;
    Ok(())
}

pub(crate) async fn tx_set_subscription(
    conn: &mut SqliteConnection,
    account_id: Uuid,
    tier: Tier,
    bot_enabled: bool,
) -> Result<()> {
    sqlx::query("UPDATE accounts SET tier = ?, bot_enabled = ? WHERE id = ?")
        .bind(tier.as_str())
        .bind(bot_enabled)
        .bind(account_id.to_string())
        .execute(conn)
        .await?;
    Ok(())
}

pub(crate) async fn tx_set_bot_enabled(
    conn: &mut SqliteConnection,
    account_id: Uuid,
    enabled: bool,
) -> Result<()> {
    sqlx::query("UPDATE accounts SET bot_enabled = ? WHERE id = ?")
        .bind(enabled)
        .bind(account_id.to_string())
        .execute(conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn scaled_codecs_round_trip() {
        assert_eq!(from_money(to_money(dec!(1234.56))), dec!(1234.56));
        assert_eq!(from_money(to_money(dec!(-0.01))), dec!(-0.01));
        assert_eq!(
            from_price(to_price(dec!(67000.12345678))),
            dec!(67000.12345678)
        );
        assert_eq!(from_price(to_price(dec!(0.00014925))), dec!(0.00014925));
    }

    #[tokio::test]
    async fn account_round_trips_through_storage() {
        let db = Database::in_memory().await.unwrap();
        let account = db
            .create_account("a@example.com", dec!(1000.00), Some(Tier::Basic), true)
            .await
            .unwrap();

        assert_eq!(account.balance, dec!(1000.00));
        assert_eq!(account.tier, Some(Tier::Basic));
        assert!(account.is_simulatable());

        let fetched = db.get_account(account.id).await.unwrap();
        assert_eq!(fetched.email, "a@example.com");
        assert_eq!(fetched.initial_balance, dec!(1000.00));
    }

    #[tokio::test]
    async fn simulatable_accounts_skips_disabled() {
        let db = Database::in_memory().await.unwrap();
        db.create_account("on@example.com", dec!(100), Some(Tier::Basic), true)
            .await
            .unwrap();
        db.create_account("off@example.com", dec!(100), Some(Tier::Basic), false)
            .await
            .unwrap();

        let rows = db.simulatable_accounts().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].email, "on@example.com");
    }
}
