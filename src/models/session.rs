//! Trading session: aggregate bookkeeping for one continuous bot run.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Tier;

/// Aggregate record for one continuous run of bot activity for one account.
///
/// At most one session per account is active at a time; the engine enforces
/// this under the account lock, not the storage layer. Counters are updated
/// with relative deltas so concurrent touches compose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub account_id: Uuid,
    /// Tier at session start.
    pub tier: Tier,
    pub starting_balance: Decimal,
    /// Mirrors the account balance at the engine's last touch.
    pub current_balance: Decimal,
    pub total_profit: Decimal,
    pub total_trades: i64,
    pub winning_trades: i64,
    pub is_active: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Begin a fresh session at the account's current balance.
    pub fn begin(account_id: Uuid, tier: Tier, balance: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            tier,
            starting_balance: balance,
            current_balance: balance,
            total_profit: Decimal::ZERO,
            total_trades: 0,
            winning_trades: 0,
            is_active: true,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Winning percentage over closed trades; 0 when no trades yet.
    pub fn win_rate(&self) -> f64 {
        if self.total_trades > 0 {
            self.winning_trades as f64 / self.total_trades as f64 * 100.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn win_rate_is_zero_without_trades() {
        let session = Session::begin(Uuid::new_v4(), Tier::Basic, dec!(1000));
        assert_eq!(session.win_rate(), 0.0);
    }

    #[test]
    fn win_rate_is_bounded() {
        let mut session = Session::begin(Uuid::new_v4(), Tier::Basic, dec!(1000));
        session.total_trades = 8;
        session.winning_trades = 6;
        let rate = session.win_rate();
        assert!((0.0..=100.0).contains(&rate));
        assert!((rate - 75.0).abs() < f64::EPSILON);
    }
}
