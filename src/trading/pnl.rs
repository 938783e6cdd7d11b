//! Profit/loss calculation with fees.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::models::{quantize_money, Side};

/// Round-trip fee charged on the entry notional, as a fraction (0.2%).
pub const FEE_PERCENT: Decimal = dec!(0.002);

/// Compute `(profit_loss, profit_loss_percent)` for a closed position.
///
/// Raw P&L is `(exit - entry) * quantity`, sign-flipped for shorts. A fee
/// of 0.2% of the entry notional is subtracted before truncating to 2
/// fractional digits. Truncation is plain (toward zero), which loses up to
/// a cent per close; tests tolerate one unit in the last place.
///
/// A zero or negative entry price yields a `0.00` percent rather than a
/// division fault.
pub fn compute_pnl(
    entry_price: Decimal,
    exit_price: Decimal,
    quantity: Decimal,
    side: Side,
) -> (Decimal, Decimal) {
    let raw = match side {
        Side::Long => (exit_price - entry_price) * quantity,
        Side::Short => (entry_price - exit_price) * quantity,
    };

    let fees = entry_price * quantity * FEE_PERCENT;
    let profit_loss = quantize_money(raw - fees);

    let percent = if entry_price > Decimal::ZERO {
        let move_pct = match side {
            Side::Long => (exit_price - entry_price) / entry_price * dec!(100),
            Side::Short => (entry_price - exit_price) / entry_price * dec!(100),
        };
        move_pct - FEE_PERCENT * dec!(100)
    } else {
        Decimal::ZERO
    };

    (profit_loss, quantize_money(percent))
}
