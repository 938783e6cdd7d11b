//! Position model: one simulated buy-or-sell exposure with an entry price,
//! optional exit price, and P&L.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }

    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "long" => Ok(Side::Long),
            "short" => Ok(Side::Short),
            other => Err(EngineError::Decode(format!("unknown side '{other}'"))),
        }
    }
}

/// Lifecycle state. CLOSED is terminal; the engine never reopens a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionState {
    Open,
    Closed,
}

/// One simulated market position.
///
/// Invariant: `exit_price`, `closed_at` are `None` and P&L fields are zero
/// while OPEN; all are set once CLOSED. The close mutation happens exactly
/// once, inside the accountant's atomic unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub account_id: Uuid,
    /// Trading pair, e.g. "BTC/USDT".
    pub symbol: String,
    pub side: Side,
    /// Entry price, 8 fractional digits.
    pub entry_price: Decimal,
    /// Exit price, 8 fractional digits. Set at close.
    pub exit_price: Option<Decimal>,
    /// Quantity, 8 fractional digits.
    pub quantity: Decimal,
    /// Realized P&L in currency, 2 fractional digits. Zero while OPEN.
    pub profit_loss: Decimal,
    /// Realized P&L percent, 2 fractional digits. Zero while OPEN.
    pub profit_loss_percent: Decimal,
    pub state: PositionState,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    /// Create a new OPEN position with zeroed P&L fields.
    pub fn open(
        account_id: Uuid,
        symbol: String,
        side: Side,
        entry_price: Decimal,
        quantity: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            symbol,
            side,
            entry_price,
            exit_price: None,
            quantity,
            profit_loss: Decimal::ZERO,
            profit_loss_percent: Decimal::ZERO,
            state: PositionState::Open,
            opened_at,
            closed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == PositionState::Open
    }

    /// Currency value committed at entry.
    pub fn notional(&self) -> Decimal {
        self.entry_price * self.quantity
    }

    /// Seconds this position has been open as of `now`.
    pub fn held_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.opened_at).num_seconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn open_position_has_no_close_fields() {
        let pos = Position::open(
            Uuid::new_v4(),
            "BTC/USDT".to_string(),
            Side::Long,
            dec!(67000.00000000),
            dec!(0.00014925),
            Utc::now(),
        );

        assert!(pos.is_open());
        assert!(pos.exit_price.is_none());
        assert!(pos.closed_at.is_none());
        assert_eq!(pos.profit_loss, Decimal::ZERO);
        assert_eq!(pos.profit_loss_percent, Decimal::ZERO);
    }

    #[test]
    fn notional_is_entry_times_quantity() {
        let pos = Position::open(
            Uuid::new_v4(),
            "BTC/USDT".to_string(),
            Side::Long,
            dec!(67000),
            dec!(0.00014925),
            Utc::now(),
        );
        assert_eq!(pos.notional(), dec!(9.99975));
    }

    #[test]
    fn side_round_trips() {
        assert_eq!(Side::parse("long").unwrap(), Side::Long);
        assert_eq!(Side::parse("short").unwrap(), Side::Short);
        assert!(Side::parse("buy").is_err());
    }
}
