//! Position lifecycle: the open pass and the close pass for one account.
//!
//! The engine decides WHAT happens to positions (which symbol, which side,
//! when to close, at what exit); the accountant decides HOW it lands in
//! storage. All randomness flows through the caller's RNG handle so a run
//! is reproducible from a seed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info, warn};

use crate::config::TierConfig;
use crate::db::{CloseRequest, LedgerAccountant, OpenRecord};
use crate::error::{EngineError, Result};
use crate::market::{profit_target, symbol_weight, MarketSimulator};
use crate::models::{quantize_price, Account, Position, Side};
use crate::notify::{NotificationPort, TracingNotifier, TradeEvent, TradeSnapshot};
use crate::trading::{compute_pnl, PositionSizer};

/// Probability an eligible position is closed on any one pass.
const CLOSE_PROBABILITY: f64 = 0.70;

/// Fixed long bias for side selection.
const LONG_BIAS: f64 = 0.55;

/// Why an open attempt produced no position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No price available for the chosen symbol.
    NoPrice,
    /// Balance below the minimum trade notional.
    InsufficientBalance,
    /// Sizing produced a zero or negative quantity.
    ZeroQuantity,
    /// Account is already at its position limit.
    LimitReached,
}

/// Result of one open attempt.
#[derive(Debug, Clone)]
pub enum OpenOutcome {
    Opened(Position),
    Skipped(SkipReason),
}

/// What a close pass did.
#[derive(Debug, Clone, Default)]
pub struct ClosePassReport {
    /// OPEN positions examined.
    pub examined: usize,
    /// Positions actually closed.
    pub closed: usize,
    /// Summed realized P&L of the closes.
    pub realized: Decimal,
}

/// Runs the open and close passes for one account.
#[derive(Clone)]
pub struct LifecycleEngine {
    accountant: LedgerAccountant,
    notifier: Arc<dyn NotificationPort>,
}

impl LifecycleEngine {
    pub fn new(accountant: LedgerAccountant) -> Self {
        Self {
            accountant,
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn with_notifier(accountant: LedgerAccountant, notifier: Arc<dyn NotificationPort>) -> Self {
        Self {
            accountant,
            notifier,
        }
    }

    pub fn accountant(&self) -> &LedgerAccountant {
        &self.accountant
    }

    /// Attempt to open positions for this cycle.
    ///
    /// Skip conditions (no price, balance below minimum, zero quantity,
    /// limit reached) end the attempt quietly; only storage and
    /// configuration failures propagate.
    pub async fn open_pass<R: Rng + ?Sized>(
        &self,
        account: &Account,
        config: &TierConfig,
        simulator: &MarketSimulator,
        rng: &mut R,
    ) -> Result<Vec<OpenOutcome>> {
        let db = self.accountant.db();
        let session = self
            .accountant
            .ensure_session(account.id, config.tier)
            .await?;

        let attempts = if config.trades_per_run.0 == config.trades_per_run.1 {
            config.trades_per_run.0
        } else {
            rng.gen_range(config.trades_per_run.0..=config.trades_per_run.1)
        };

        let mut outcomes = Vec::with_capacity(attempts as usize);
        for _ in 0..attempts {
            let open_count = db.count_open_positions(account.id).await?;
            if open_count >= i64::from(config.max_open_positions) {
                debug!(account = %account.id, open_count, "Position limit reached");
                outcomes.push(OpenOutcome::Skipped(SkipReason::LimitReached));
                continue;
            }

            let Some(symbol) = pick_symbol(simulator, rng) else {
                outcomes.push(OpenOutcome::Skipped(SkipReason::NoPrice));
                continue;
            };
            let Some(entry_price) = simulator.current_price(&symbol, rng) else {
                debug!(account = %account.id, symbol = %symbol, "No price, skipping open");
                outcomes.push(OpenOutcome::Skipped(SkipReason::NoPrice));
                continue;
            };

            let side = if rng.gen_range(0.0..1.0) < LONG_BIAS {
                Side::Long
            } else {
                Side::Short
            };

            let balance = db.get_account(account.id).await?.balance;
            let sizer = PositionSizer::new(config);
            let sizing = match sizer.calculate(balance, entry_price, open_count as u32) {
                Ok(Some(sizing)) => sizing,
                Ok(None) => {
                    outcomes.push(OpenOutcome::Skipped(SkipReason::ZeroQuantity));
                    continue;
                }
                Err(EngineError::InsufficientBalance { balance, minimum }) => {
                    debug!(account = %account.id, %balance, %minimum, "Balance below minimum, skipping open");
                    outcomes.push(OpenOutcome::Skipped(SkipReason::InsufficientBalance));
                    continue;
                }
                Err(e) => return Err(e),
            };

            let position = Position::open(
                account.id,
                symbol,
                side,
                entry_price,
                sizing.quantity,
                Utc::now(),
            );

            match self
                .accountant
                .record_open(&position, config.max_open_positions)
                .await?
            {
                OpenRecord::Recorded { balance, .. } => {
                    let snapshot = TradeSnapshot::opened(&position, balance);
                    self.notifier.notify(TradeEvent::Opened, &snapshot).await;
                    outcomes.push(OpenOutcome::Opened(position));
                }
                OpenRecord::LimitReached => {
                    outcomes.push(OpenOutcome::Skipped(SkipReason::LimitReached));
                }
            }
        }

        debug!(
            account = %account.id,
            session = %session.id,
            attempts,
            opened = outcomes.iter().filter(|o| matches!(o, OpenOutcome::Opened(_))).count(),
            "Open pass complete"
        );
        Ok(outcomes)
    }

    /// Examine every OPEN position and close the ones whose time has come,
    /// settling each close in its own lock acquisition cycle.
    ///
    /// Positions younger than the minimum hold are never touched; positions
    /// past the maximum hold always close; those in between close with a
    /// fixed probability per pass, so turnover is gradual.
    pub async fn close_pass<R: Rng + ?Sized>(
        &self,
        account: &Account,
        config: &TierConfig,
        simulator: &MarketSimulator,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<ClosePassReport> {
        let (mut report, requests) = self.plan_closes(account, config, simulator, now, rng).await?;

        for request in &requests {
            let receipt = match self.accountant.settle_close(account.id, request).await {
                Ok(receipt) => receipt,
                Err(EngineError::AlreadyClosed(id)) => {
                    warn!(account = %account.id, position = %id, "Position closed out from under us");
                    continue;
                }
                Err(e) => return Err(e),
            };

            report.closed += 1;
            report.realized += receipt.position.profit_loss;

            let snapshot = TradeSnapshot::closed(&receipt.position, receipt.new_balance);
            self.notifier.notify(TradeEvent::Closed, &snapshot).await;
        }

        self.log_close_pass(account, &report);
        Ok(report)
    }

    /// Close pass with grouped writes: one lock acquisition, one
    /// transaction, one summed delta for all of the account's closes.
    pub async fn close_pass_bulk<R: Rng + ?Sized>(
        &self,
        account: &Account,
        config: &TierConfig,
        simulator: &MarketSimulator,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<ClosePassReport> {
        let (mut report, requests) = self.plan_closes(account, config, simulator, now, rng).await?;
        if requests.is_empty() {
            return Ok(report);
        }

        let receipts = self.accountant.settle_close_batch(account.id, &requests).await?;
        for receipt in &receipts {
            report.closed += 1;
            report.realized += receipt.position.profit_loss;

            let snapshot = TradeSnapshot::closed(&receipt.position, receipt.new_balance);
            self.notifier.notify(TradeEvent::Closed, &snapshot).await;
        }

        self.log_close_pass(account, &report);
        Ok(report)
    }

    /// Decide which positions close this pass and at what price. Pure apart
    /// from the open-positions read; no lock is held while exits are
    /// computed.
    async fn plan_closes<R: Rng + ?Sized>(
        &self,
        account: &Account,
        config: &TierConfig,
        simulator: &MarketSimulator,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<(ClosePassReport, Vec<CloseRequest>)> {
        let positions = self.accountant.db().open_positions(account.id).await?;
        let report = ClosePassReport {
            examined: positions.len(),
            ..Default::default()
        };

        let min_hold = config.min_open_duration.num_seconds();
        let max_hold = config.max_open_duration.num_seconds();

        let mut requests = Vec::new();
        for position in &positions {
            let held = position.held_seconds(now);
            if held < min_hold {
                continue;
            }
            let due = held >= max_hold || rng.gen_bool(CLOSE_PROBABILITY);
            if !due {
                continue;
            }

            let target = profit_target(config, rng);
            let mut exit_price =
                simulator.realistic_exit(position.entry_price, target, position.side, held, rng);
            if exit_price <= Decimal::ZERO {
                exit_price = quantize_price(position.entry_price * dec!(0.99));
            }

            let (profit_loss, profit_loss_percent) = compute_pnl(
                position.entry_price,
                exit_price,
                position.quantity,
                position.side,
            );

            requests.push(CloseRequest {
                position_id: position.id,
                exit_price,
                profit_loss,
                profit_loss_percent,
                closed_at: now,
            });
        }

        Ok((report, requests))
    }

    fn log_close_pass(&self, account: &Account, report: &ClosePassReport) {
        if report.closed > 0 {
            info!(
                account = %account.id,
                closed = report.closed,
                realized = %report.realized,
                "Close pass complete"
            );
        }
    }
}

/// Weighted random symbol draw; majors carry triple weight.
fn pick_symbol<R: Rng + ?Sized>(simulator: &MarketSimulator, rng: &mut R) -> Option<String> {
    let symbols = simulator.symbols();
    if symbols.is_empty() {
        warn!("Simulator has no symbols to draw from");
        return None;
    }

    let total: u32 = symbols.iter().map(|s| symbol_weight(s)).sum();
    let mut pick = rng.gen_range(0..total);
    for symbol in &symbols {
        let weight = symbol_weight(symbol);
        if pick < weight {
            return Some((*symbol).to_string());
        }
        pick -= weight;
    }
    // Unreachable: the draw is bounded by the summed weights.
    symbols.last().map(|s| (*s).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::fallback_prices;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    #[test]
    fn majors_dominate_the_symbol_draw() {
        let simulator = MarketSimulator::new(fallback_prices());
        let mut rng = StdRng::seed_from_u64(11);

        let mut counts: HashMap<String, u32> = HashMap::new();
        for _ in 0..5000 {
            let symbol = pick_symbol(&simulator, &mut rng).unwrap();
            *counts.entry(symbol).or_default() += 1;
        }

        let btc = counts.get("BTC/USDT").copied().unwrap_or(0);
        let bnb = counts.get("BNB/USDT").copied().unwrap_or(0);
        // weight 3 vs 1: BTC should be drawn roughly three times as often
        assert!(btc > bnb * 2, "btc {btc} vs bnb {bnb}");
    }

    #[test]
    fn empty_simulator_yields_no_symbol() {
        let simulator = MarketSimulator::new(HashMap::new());
        let mut rng = StdRng::seed_from_u64(11);
        assert!(pick_symbol(&simulator, &mut rng).is_none());
    }
}
