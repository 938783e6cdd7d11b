//! Atomic session/balance/ledger mutations.
//!
//! Every operation here follows the same protocol: acquire the account's
//! exclusive guard, open one transaction, re-read rows inside it in a fixed
//! order (account, then session, then position), mutate, append the paired
//! ledger entry, apply delta updates to session aggregates and the account
//! balance, and commit. All of it lands or none of it does. The guard is
//! never held across a call to the price oracle; exits are computed before
//! settlement begins.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{Tier, TierConfig};
use crate::error::{EngineError, Result};
use crate::models::{
    quantize_money, Account, LedgerEntry, LedgerKind, LedgerStatus, Position, PositionState,
    Session,
};

use super::{
    tx_apply_balance_delta, tx_bump_session, tx_close_position, tx_count_open_positions,
    tx_end_session, tx_fetch_account, tx_fetch_active_session, tx_fetch_ledger_entry,
    tx_fetch_position, tx_insert_ledger_entry, tx_insert_position, tx_insert_session,
    tx_set_bot_enabled, tx_set_subscription, tx_settle_ledger_entry, AccountLocks, Database,
};

/// Commission withheld from approved withdrawals.
const WITHDRAWAL_COMMISSION_RATE: Decimal = dec!(0.25);

/// A fully computed close, ready to be settled.
#[derive(Debug, Clone)]
pub struct CloseRequest {
    pub position_id: Uuid,
    pub exit_price: Decimal,
    pub profit_loss: Decimal,
    pub profit_loss_percent: Decimal,
    pub closed_at: DateTime<Utc>,
}

/// What a settled close produced.
#[derive(Debug, Clone)]
pub struct CloseReceipt {
    pub position: Position,
    pub entry: LedgerEntry,
    pub session: Session,
    pub new_balance: Decimal,
}

/// Result of recording an open.
#[derive(Debug, Clone)]
pub enum OpenRecord {
    Recorded { session: Session, balance: Decimal },
    /// The limit was re-checked under the lock and had been reached by a
    /// concurrent worker; the caller skips the trade.
    LimitReached,
}

/// Performs the lock-protected mutation of sessions, the ledger, and the
/// account balance. Cheap to clone; clones share the lock registry.
#[derive(Clone)]
pub struct LedgerAccountant {
    db: Arc<Database>,
    locks: Arc<AccountLocks>,
}

impl LedgerAccountant {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            locks: Arc::new(AccountLocks::new()),
        }
    }

    /// Share an existing lock registry (request layer and simulation
    /// workers must use the same one).
    pub fn with_locks(db: Arc<Database>, locks: Arc<AccountLocks>) -> Self {
        Self { db, locks }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    // ==================== Sessions ====================

    /// Resume the account's active session or begin a fresh one at the
    /// current balance. The single-active-session invariant is enforced
    /// here, under the account guard.
    pub async fn ensure_session(&self, account_id: Uuid, tier: Tier) -> Result<Session> {
        let _guard = self.locks.acquire(account_id).await?;
        let mut tx = self.db.pool().begin().await?;

        if let Some(session) = tx_fetch_active_session(&mut tx, account_id).await? {
            tx.commit().await?;
            return Ok(session);
        }

        let account = tx_fetch_account(&mut tx, account_id).await?;
        let session = Session::begin(account_id, tier, account.balance);
        tx_insert_session(&mut tx, &session).await?;
        tx.commit().await?;

        info!(account = %account_id, session = %session.id, tier = %tier, "Started trading session");
        Ok(session)
    }

    /// Deactivate the active session, if any.
    pub async fn end_session(&self, account_id: Uuid) -> Result<Option<Session>> {
        let _guard = self.locks.acquire(account_id).await?;
        let mut tx = self.db.pool().begin().await?;

        let Some(mut session) = tx_fetch_active_session(&mut tx, account_id).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        tx_end_session(&mut tx, session.id, now).await?;
        tx.commit().await?;

        session.is_active = false;
        session.ended_at = Some(now);
        info!(account = %account_id, session = %session.id, "Ended trading session");
        Ok(Some(session))
    }

    /// Flip the master bot switch off and end any active session.
    pub async fn disable_bot(&self, account_id: Uuid) -> Result<Option<Session>> {
        let _guard = self.locks.acquire(account_id).await?;
        let mut tx = self.db.pool().begin().await?;

        tx_set_bot_enabled(&mut tx, account_id, false).await?;

        let session = tx_fetch_active_session(&mut tx, account_id).await?;
        let now = Utc::now();
        if let Some(ref s) = session {
            tx_end_session(&mut tx, s.id, now).await?;
        }
        tx.commit().await?;

        Ok(session.map(|mut s| {
            s.is_active = false;
            s.ended_at = Some(now);
            s
        }))
    }

    // ==================== Position lifecycle ====================

    /// Record a newly opened position and bump the session trade counter
    /// in one atomic unit. The position limit is re-checked under the
    /// guard so the invariant holds against concurrent workers.
    pub async fn record_open(&self, position: &Position, max_open: u32) -> Result<OpenRecord> {
        let _guard = self.locks.acquire(position.account_id).await?;
        let mut tx = self.db.pool().begin().await?;

        let account = tx_fetch_account(&mut tx, position.account_id).await?;
        let mut session = tx_fetch_active_session(&mut tx, position.account_id)
            .await?
            .ok_or(EngineError::NoActiveSession(position.account_id))?;

        let open_count = tx_count_open_positions(&mut tx, position.account_id).await?;
        if open_count >= i64::from(max_open) {
            return Ok(OpenRecord::LimitReached);
        }

        tx_insert_position(&mut tx, position).await?;
        tx_bump_session(&mut tx, session.id, 1, 0, Decimal::ZERO, Decimal::ZERO).await?;
        tx.commit().await?;

        session.total_trades += 1;
        Ok(OpenRecord::Recorded {
            session,
            balance: account.balance,
        })
    }

    /// Settle one close: mutate the position, append the ledger entry, and
    /// apply the P&L delta to the session aggregates and account balance.
    pub async fn settle_close(
        &self,
        account_id: Uuid,
        request: &CloseRequest,
    ) -> Result<CloseReceipt> {
        let _guard = self.locks.acquire(account_id).await?;
        let mut tx = self.db.pool().begin().await?;

        let account = tx_fetch_account(&mut tx, account_id).await?;
        let mut session = tx_fetch_active_session(&mut tx, account_id)
            .await?
            .ok_or(EngineError::NoActiveSession(account_id))?;

        let mut position = tx_fetch_position(&mut tx, request.position_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        if !position.is_open() {
            return Err(EngineError::AlreadyClosed(position.id));
        }

        let (entry, delta) = apply_close(&mut tx, &mut position, &mut session, request).await?;

        tx_apply_balance_delta(&mut tx, account_id, delta).await?;
        tx.commit().await?;

        let new_balance = account.balance + delta;
        session.current_balance = new_balance;

        Ok(CloseReceipt {
            position,
            entry,
            session,
            new_balance,
        })
    }

    /// Settle many closes for one account with grouped writes: one guard
    /// acquisition, one transaction, one summed delta to the session row
    /// and the balance. Positions that turn out to be already closed are
    /// skipped, never double-booked.
    pub async fn settle_close_batch(
        &self,
        account_id: Uuid,
        requests: &[CloseRequest],
    ) -> Result<Vec<CloseReceipt>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.locks.acquire(account_id).await?;
        let mut tx = self.db.pool().begin().await?;

        let account = tx_fetch_account(&mut tx, account_id).await?;
        let mut session = tx_fetch_active_session(&mut tx, account_id)
            .await?
            .ok_or(EngineError::NoActiveSession(account_id))?;

        let mut receipts = Vec::with_capacity(requests.len());
        let mut total_delta = Decimal::ZERO;
        let mut winning_count = 0i64;

        for request in requests {
            let Some(mut position) = tx_fetch_position(&mut tx, request.position_id).await? else {
                warn!(position = %request.position_id, "Close requested for unknown position");
                continue;
            };
            if !position.is_open() {
                warn!(position = %position.id, "Close requested for already closed position");
                continue;
            }

            tx_close_position(
                &mut tx,
                position.id,
                request.exit_price,
                request.profit_loss,
                request.profit_loss_percent,
                request.closed_at,
            )
            .await?;

            let kind = if request.profit_loss > Decimal::ZERO {
                LedgerKind::BotProfit
            } else {
                LedgerKind::BotLoss
            };
            let entry = LedgerEntry::new(
                account_id,
                kind,
                quantize_money(request.profit_loss.abs()),
                LedgerStatus::Completed,
            );
            tx_insert_ledger_entry(&mut tx, &entry).await?;

            mark_closed(&mut position, request);
            total_delta += request.profit_loss;
            if request.profit_loss > Decimal::ZERO {
                winning_count += 1;
            }

            receipts.push(CloseReceipt {
                position,
                entry,
                session: session.clone(),
                new_balance: Decimal::ZERO, // filled in below
            });
        }

        if receipts.is_empty() {
            return Ok(receipts);
        }

        tx_bump_session(&mut tx, session.id, 0, winning_count, total_delta, total_delta).await?;
        tx_apply_balance_delta(&mut tx, account_id, total_delta).await?;
        tx.commit().await?;

        session.current_balance = account.balance + total_delta;
        session.total_profit += total_delta;
        session.winning_trades += winning_count;

        // Walk the receipts forward so each carries the balance as of its close.
        let mut running = account.balance;
        for receipt in &mut receipts {
            running += receipt.position.profit_loss;
            receipt.new_balance = running;
            receipt.session = session.clone();
        }

        Ok(receipts)
    }

    // ==================== Request-layer ledger operations ====================

    /// Record a pending deposit request. The balance moves only on approval.
    pub async fn request_deposit(&self, account_id: Uuid, amount: Decimal) -> Result<LedgerEntry> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount(amount));
        }

        let mut tx = self.db.pool().begin().await?;
        let entry = LedgerEntry::new(
            account_id,
            LedgerKind::Deposit,
            quantize_money(amount),
            LedgerStatus::Pending,
        );
        tx_insert_ledger_entry(&mut tx, &entry).await?;
        tx.commit().await?;

        info!(account = %account_id, entry = %entry.id, amount = %entry.amount, "Deposit requested");
        Ok(entry)
    }

    /// Record a pending withdrawal request. The amount plus commission must
    /// be covered at request time; the debit happens on approval.
    pub async fn request_withdrawal(
        &self,
        account_id: Uuid,
        amount: Decimal,
    ) -> Result<LedgerEntry> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount(amount));
        }

        let _guard = self.locks.acquire(account_id).await?;
        let mut tx = self.db.pool().begin().await?;

        let account = tx_fetch_account(&mut tx, account_id).await?;
        let total = quantize_money(amount) + withdrawal_commission(amount);
        if account.balance < total {
            return Err(EngineError::InsufficientBalance {
                balance: account.balance,
                minimum: total,
            });
        }

        let entry = LedgerEntry::new(
            account_id,
            LedgerKind::Withdrawal,
            quantize_money(amount),
            LedgerStatus::Pending,
        );
        tx_insert_ledger_entry(&mut tx, &entry).await?;
        tx.commit().await?;

        info!(account = %account_id, entry = %entry.id, amount = %entry.amount, "Withdrawal requested");
        Ok(entry)
    }

    /// Approve a pending entry: mark it completed and apply its signed
    /// amount to the balance. Withdrawals additionally book a completed
    /// commission entry in the same atomic unit.
    pub async fn approve_entry(&self, entry_id: Uuid) -> Result<LedgerEntry> {
        let pending = self.db.get_ledger_entry(entry_id).await?;

        let _guard = self.locks.acquire(pending.account_id).await?;
        let mut tx = self.db.pool().begin().await?;

        let account = tx_fetch_account(&mut tx, pending.account_id).await?;
        let mut entry = tx_fetch_ledger_entry(&mut tx, entry_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        if entry.status != LedgerStatus::Pending {
            return Err(EngineError::EntryNotPending {
                id: entry.id,
                status: entry.status.as_str().to_string(),
            });
        }

        let mut delta = entry.kind.sign() * entry.amount;

        if entry.kind == LedgerKind::Withdrawal {
            let commission = withdrawal_commission(entry.amount);
            if account.balance < entry.amount + commission {
                return Err(EngineError::InsufficientBalance {
                    balance: account.balance,
                    minimum: entry.amount + commission,
                });
            }

            let commission_entry = LedgerEntry::new(
                entry.account_id,
                LedgerKind::Commission,
                commission,
                LedgerStatus::Completed,
            );
            tx_insert_ledger_entry(&mut tx, &commission_entry).await?;
            delta -= commission;
        }

        let now = Utc::now();
        tx_settle_ledger_entry(&mut tx, entry.id, LedgerStatus::Completed, now).await?;
        tx_apply_balance_delta(&mut tx, entry.account_id, delta).await?;
        tx.commit().await?;

        entry.status = LedgerStatus::Completed;
        entry.processed_at = Some(now);
        info!(account = %entry.account_id, entry = %entry.id, delta = %delta, "Ledger entry approved");
        Ok(entry)
    }

    /// Reject a pending entry. The balance never moved, so nothing is
    /// refunded.
    pub async fn reject_entry(&self, entry_id: Uuid) -> Result<LedgerEntry> {
        let pending = self.db.get_ledger_entry(entry_id).await?;

        let _guard = self.locks.acquire(pending.account_id).await?;
        let mut tx = self.db.pool().begin().await?;

        let mut entry = tx_fetch_ledger_entry(&mut tx, entry_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        if entry.status != LedgerStatus::Pending {
            return Err(EngineError::EntryNotPending {
                id: entry.id,
                status: entry.status.as_str().to_string(),
            });
        }

        let now = Utc::now();
        tx_settle_ledger_entry(&mut tx, entry.id, LedgerStatus::Rejected, now).await?;
        tx.commit().await?;

        entry.status = LedgerStatus::Rejected;
        entry.processed_at = Some(now);
        Ok(entry)
    }

    /// Purchase a bot subscription: debit the tier price with a completed
    /// `bot_purchase` entry and enable the bot, all in one atomic unit.
    pub async fn purchase_bot(&self, account_id: Uuid, tier: Tier) -> Result<Account> {
        let price = TierConfig::for_tier(tier).price;

        let _guard = self.locks.acquire(account_id).await?;
        let mut tx = self.db.pool().begin().await?;

        let mut account = tx_fetch_account(&mut tx, account_id).await?;
        if account.balance < price {
            return Err(EngineError::InsufficientBalance {
                balance: account.balance,
                minimum: price,
            });
        }

        let entry = LedgerEntry::new(
            account_id,
            LedgerKind::BotPurchase,
            price,
            LedgerStatus::Completed,
        );
        tx_insert_ledger_entry(&mut tx, &entry).await?;
        tx_apply_balance_delta(&mut tx, account_id, -price).await?;
        tx_set_subscription(&mut tx, account_id, tier, true).await?;
        tx.commit().await?;

        account.balance -= price;
        account.tier = Some(tier);
        account.bot_enabled = true;
        info!(account = %account_id, tier = %tier, price = %price, "Bot purchased");
        Ok(account)
    }
}

fn withdrawal_commission(amount: Decimal) -> Decimal {
    quantize_money(amount * WITHDRAWAL_COMMISSION_RATE)
}

fn mark_closed(position: &mut Position, request: &CloseRequest) {
    position.exit_price = Some(request.exit_price);
    position.profit_loss = request.profit_loss;
    position.profit_loss_percent = request.profit_loss_percent;
    position.state = PositionState::Closed;
    position.closed_at = Some(request.closed_at);
}

/// Shared single-close body: position mutation, ledger append, session
/// deltas. Balance delta is left to the caller.
async fn apply_close(
    tx: &mut sqlx::SqliteConnection,
    position: &mut Position,
    session: &mut Session,
    request: &CloseRequest,
) -> Result<(LedgerEntry, Decimal)> {
    tx_close_position(
        tx,
        position.id,
        request.exit_price,
        request.profit_loss,
        request.profit_loss_percent,
        request.closed_at,
    )
    .await?;

    let winning = request.profit_loss > Decimal::ZERO;
    let kind = if winning {
        LedgerKind::BotProfit
    } else {
        LedgerKind::BotLoss
    };
    let entry = LedgerEntry::new(
        position.account_id,
        kind,
        quantize_money(request.profit_loss.abs()),
        LedgerStatus::Completed,
    );
    tx_insert_ledger_entry(tx, &entry).await?;

    tx_bump_session(
        tx,
        session.id,
        0,
        i64::from(winning),
        request.profit_loss,
        request.profit_loss,
    )
    .await?;

    mark_closed(position, request);
    session.total_profit += request.profit_loss;
    if winning {
        session.winning_trades += 1;
    }

    Ok((entry, request.profit_loss))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Side;
    use crate::trading::compute_pnl;
    use rust_decimal_macros::dec;

    async fn setup(balance: Decimal) -> (LedgerAccountant, Account) {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let account = db
            .create_account("trader@example.com", balance, Some(Tier::Basic), true)
            .await
            .unwrap();
        (LedgerAccountant::new(db), account)
    }

    async fn open_position(
        accountant: &LedgerAccountant,
        account: &Account,
        entry: Decimal,
        quantity: Decimal,
    ) -> Position {
        let position = Position::open(
            account.id,
            "BTC/USDT".to_string(),
            Side::Long,
            entry,
            quantity,
            Utc::now(),
        );
        let record = accountant.record_open(&position, 3).await.unwrap();
        assert!(matches!(record, OpenRecord::Recorded { .. }));
        position
    }

    fn close_request(position: &Position, exit: Decimal) -> CloseRequest {
        let (profit_loss, profit_loss_percent) =
            compute_pnl(position.entry_price, exit, position.quantity, position.side);
        CloseRequest {
            position_id: position.id,
            exit_price: exit,
            profit_loss,
            profit_loss_percent,
            closed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn winning_close_books_profit_entry_and_balance() {
        let (accountant, account) = setup(dec!(1000.00)).await;
        accountant.ensure_session(account.id, Tier::Basic).await.unwrap();

        let position =
            open_position(&accountant, &account, dec!(67000.00000000), dec!(0.00014925)).await;
        let receipt = accountant
            .settle_close(account.id, &close_request(&position, dec!(67955.00000000)))
            .await
            .unwrap();

        // (67955 - 67000) * 0.00014925 - 0.2% fee, truncated
        assert_eq!(receipt.position.profit_loss, dec!(0.12));
        assert_eq!(receipt.position.profit_loss_percent, dec!(1.22));
        assert_eq!(receipt.new_balance, dec!(1000.12));
        assert_eq!(receipt.entry.kind, LedgerKind::BotProfit);
        assert_eq!(receipt.entry.amount, dec!(0.12));
        assert_eq!(receipt.session.winning_trades, 1);

        let db = accountant.db();
        let stored = db.get_account(account.id).await.unwrap();
        assert_eq!(stored.balance, dec!(1000.12));
        assert_eq!(db.reconstruct_balance(account.id).await.unwrap(), stored.balance);

        let closed = db.get_position(position.id).await.unwrap();
        assert!(!closed.is_open());
        assert_eq!(closed.exit_price, Some(dec!(67955.00000000)));
        assert!(closed.closed_at.unwrap() >= closed.opened_at);
    }

    #[tokio::test]
    async fn closing_twice_is_rejected_without_a_second_entry() {
        let (accountant, account) = setup(dec!(1000.00)).await;
        accountant.ensure_session(account.id, Tier::Basic).await.unwrap();

        let position =
            open_position(&accountant, &account, dec!(67000.00000000), dec!(0.00014925)).await;
        let request = close_request(&position, dec!(67955.00000000));

        accountant.settle_close(account.id, &request).await.unwrap();
        let err = accountant.settle_close(account.id, &request).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyClosed(id) if id == position.id));

        let entries = accountant.db().ledger_entries(account.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(accountant.db().get_account(account.id).await.unwrap().balance, dec!(1000.12));
    }

    #[tokio::test]
    async fn record_open_enforces_the_position_limit() {
        let (accountant, account) = setup(dec!(1000.00)).await;
        accountant.ensure_session(account.id, Tier::Basic).await.unwrap();

        for _ in 0..3 {
            open_position(&accountant, &account, dec!(100.00000000), dec!(0.10000000)).await;
        }

        let extra = Position::open(
            account.id,
            "ETH/USDT".to_string(),
            Side::Short,
            dec!(3500.00000000),
            dec!(0.01000000),
            Utc::now(),
        );
        let record = accountant.record_open(&extra, 3).await.unwrap();
        assert!(matches!(record, OpenRecord::LimitReached));
        assert_eq!(accountant.db().count_open_positions(account.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn batch_settlement_sums_deltas_and_skips_closed_positions() {
        let (accountant, account) = setup(dec!(1000.00)).await;
        accountant.ensure_session(account.id, Tier::Basic).await.unwrap();

        let first =
            open_position(&accountant, &account, dec!(67000.00000000), dec!(0.00014925)).await;
        let second =
            open_position(&accountant, &account, dec!(67000.00000000), dec!(0.00014925)).await;

        // Close the first individually, then batch both; the batch must
        // settle only the second.
        let first_request = close_request(&first, dec!(67955.00000000));
        accountant.settle_close(account.id, &first_request).await.unwrap();

        let receipts = accountant
            .settle_close_batch(
                account.id,
                &[first_request, close_request(&second, dec!(67955.00000000))],
            )
            .await
            .unwrap();

        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].position.id, second.id);
        assert_eq!(receipts[0].new_balance, dec!(1000.24));

        let db = accountant.db();
        assert_eq!(db.ledger_entries(account.id).await.unwrap().len(), 2);
        assert_eq!(db.get_account(account.id).await.unwrap().balance, dec!(1000.24));
        assert_eq!(db.reconstruct_balance(account.id).await.unwrap(), dec!(1000.24));
    }

    #[tokio::test]
    async fn deposit_moves_balance_only_on_approval() {
        let (accountant, account) = setup(dec!(100.00)).await;

        let entry = accountant.request_deposit(account.id, dec!(50.00)).await.unwrap();
        assert_eq!(entry.status, LedgerStatus::Pending);
        assert_eq!(accountant.db().get_account(account.id).await.unwrap().balance, dec!(100.00));

        let approved = accountant.approve_entry(entry.id).await.unwrap();
        assert_eq!(approved.status, LedgerStatus::Completed);
        assert!(approved.processed_at.is_some());
        assert_eq!(accountant.db().get_account(account.id).await.unwrap().balance, dec!(150.00));
    }

    #[tokio::test]
    async fn rejected_deposit_never_touches_the_balance() {
        let (accountant, account) = setup(dec!(100.00)).await;

        let entry = accountant.request_deposit(account.id, dec!(50.00)).await.unwrap();
        let rejected = accountant.reject_entry(entry.id).await.unwrap();
        assert_eq!(rejected.status, LedgerStatus::Rejected);
        assert_eq!(accountant.db().get_account(account.id).await.unwrap().balance, dec!(100.00));
        assert_eq!(accountant.db().reconstruct_balance(account.id).await.unwrap(), dec!(100.00));
    }

    #[tokio::test]
    async fn withdrawal_approval_debits_amount_plus_commission() {
        let (accountant, account) = setup(dec!(1000.00)).await;

        let entry = accountant.request_withdrawal(account.id, dec!(100.00)).await.unwrap();
        assert_eq!(accountant.db().get_account(account.id).await.unwrap().balance, dec!(1000.00));

        accountant.approve_entry(entry.id).await.unwrap();

        // 100.00 withdrawal + 25.00 commission
        let balance = accountant.db().get_account(account.id).await.unwrap().balance;
        assert_eq!(balance, dec!(875.00));

        let entries = accountant.db().ledger_entries(account.id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.kind == LedgerKind::Commission && e.amount == dec!(25.00)));
        assert_eq!(accountant.db().reconstruct_balance(account.id).await.unwrap(), balance);
    }

    #[tokio::test]
    async fn withdrawal_beyond_coverage_is_rejected_up_front() {
        let (accountant, account) = setup(dec!(100.00)).await;

        // 90 + 22.50 commission exceeds the 100.00 balance
        let err = accountant.request_withdrawal(account.id, dec!(90.00)).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientBalance { .. }));
        assert!(accountant.db().ledger_entries(account.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn settled_entries_cannot_be_approved_again() {
        let (accountant, account) = setup(dec!(100.00)).await;

        let entry = accountant.request_deposit(account.id, dec!(50.00)).await.unwrap();
        accountant.approve_entry(entry.id).await.unwrap();

        let err = accountant.approve_entry(entry.id).await.unwrap_err();
        assert!(matches!(err, EngineError::EntryNotPending { .. }));
        assert_eq!(accountant.db().get_account(account.id).await.unwrap().balance, dec!(150.00));
    }

    #[tokio::test]
    async fn non_positive_amounts_are_invalid() {
        let (accountant, account) = setup(dec!(100.00)).await;

        let err = accountant.request_deposit(account.id, Decimal::ZERO).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount(_)));
        let err = accountant.request_withdrawal(account.id, dec!(-5.00)).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn purchasing_a_bot_debits_the_tier_price_and_enables_it() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let account = db
            .create_account("buyer@example.com", dec!(300.00), None, false)
            .await
            .unwrap();
        let accountant = LedgerAccountant::new(db);

        let updated = accountant.purchase_bot(account.id, Tier::Basic).await.unwrap();
        assert_eq!(updated.balance, dec!(50.00));
        assert_eq!(updated.tier, Some(Tier::Basic));
        assert!(updated.bot_enabled);

        let entries = accountant.db().ledger_entries(account.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, LedgerKind::BotPurchase);
        assert_eq!(entries[0].amount, dec!(250.00));

        let err = accountant.purchase_bot(account.id, Tier::Premium).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn ensure_session_is_idempotent_per_account() {
        let (accountant, account) = setup(dec!(1000.00)).await;

        let first = accountant.ensure_session(account.id, Tier::Basic).await.unwrap();
        let second = accountant.ensure_session(account.id, Tier::Basic).await.unwrap();
        assert_eq!(first.id, second.id);

        let ended = accountant.end_session(account.id).await.unwrap().unwrap();
        assert_eq!(ended.id, first.id);
        assert!(!ended.is_active);
        assert!(accountant.end_session(account.id).await.unwrap().is_none());

        let third = accountant.ensure_session(account.id, Tier::Basic).await.unwrap();
        assert_ne!(third.id, first.id);
    }

    #[tokio::test]
    async fn disabling_the_bot_ends_the_active_session() {
        let (accountant, account) = setup(dec!(1000.00)).await;
        accountant.ensure_session(account.id, Tier::Basic).await.unwrap();

        let ended = accountant.disable_bot(account.id).await.unwrap().unwrap();
        assert!(!ended.is_active);
        assert!(ended.ended_at.is_some());
        assert!(accountant.db().active_session(account.id).await.unwrap().is_none());
        assert!(!accountant.db().get_account(account.id).await.unwrap().bot_enabled);

        // No session left to end.
        assert!(accountant.disable_bot(account.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_closes_compose_through_delta_updates() {
        // Two workers sharing one lock registry, as a simulation worker
        // and a request handler would.
        let db = Arc::new(Database::in_memory().await.unwrap());
        let account = db
            .create_account("trader@example.com", dec!(1000.00), Some(Tier::Basic), true)
            .await
            .unwrap();
        let locks = Arc::new(AccountLocks::new());
        let accountant = LedgerAccountant::with_locks(Arc::clone(&db), Arc::clone(&locks));
        accountant.ensure_session(account.id, Tier::Basic).await.unwrap();

        let first =
            open_position(&accountant, &account, dec!(67000.00000000), dec!(0.00014925)).await;
        let second =
            open_position(&accountant, &account, dec!(67000.00000000), dec!(0.00014925)).await;

        let a = {
            let accountant = accountant.clone();
            let request = close_request(&first, dec!(67955.00000000));
            tokio::spawn(async move { accountant.settle_close(account.id, &request).await })
        };
        let b = {
            let accountant = accountant.clone();
            let request = close_request(&second, dec!(67955.00000000));
            tokio::spawn(async move { accountant.settle_close(account.id, &request).await })
        };

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let db = accountant.db();
        let balance = db.get_account(account.id).await.unwrap().balance;
        assert_eq!(balance, dec!(1000.24));
        assert_eq!(db.reconstruct_balance(account.id).await.unwrap(), balance);

        let session = db.active_session(account.id).await.unwrap().unwrap();
        assert_eq!(session.total_trades, 2);
        assert_eq!(session.winning_trades, 2);
        assert_eq!(session.total_profit, dec!(0.24));
    }
}
