//! Data models for accounts, positions, sessions, and the ledger.

mod account;
mod ledger;
mod position;
mod session;

pub use account::Account;
pub use ledger::{LedgerEntry, LedgerKind, LedgerStatus};
pub use position::{Position, PositionState, Side};
pub use session::Session;

use rust_decimal::Decimal;

/// Price and quantity scale: 8 fractional digits.
pub const PRICE_SCALE: u32 = 8;
/// Currency and percent scale: 2 fractional digits.
pub const MONEY_SCALE: u32 = 2;

/// Truncate (toward zero, never round up) to 8 fractional digits and pin
/// the scale so values always carry exactly 8 digits.
pub fn quantize_price(value: Decimal) -> Decimal {
    let mut v = value.trunc_with_scale(PRICE_SCALE);
    v.rescale(PRICE_SCALE);
    v
}

/// Truncate to 2 fractional digits. Used for currency amounts and percents.
/// Plain truncation is a known source of sub-cent drift; tests tolerate one
/// unit in the last place.
pub fn quantize_money(value: Decimal) -> Decimal {
    let mut v = value.trunc_with_scale(MONEY_SCALE);
    v.rescale(MONEY_SCALE);
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn price_truncates_toward_zero() {
        assert_eq!(quantize_price(dec!(67955.123456789)), dec!(67955.12345678));
        assert_eq!(quantize_price(dec!(-0.123456789)), dec!(-0.12345678));
        assert_eq!(quantize_price(dec!(1)).scale(), PRICE_SCALE);
    }

    #[test]
    fn money_truncates_toward_zero() {
        assert_eq!(quantize_money(dec!(0.129)), dec!(0.12));
        assert_eq!(quantize_money(dec!(-0.129)), dec!(-0.12));
        assert_eq!(quantize_money(dec!(10)).scale(), MONEY_SCALE);
    }
}
