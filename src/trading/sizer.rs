//! Risk-based position sizing.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::TierConfig;
use crate::error::EngineError;
use crate::models::quantize_price;

/// Smallest notional the simulator will commit to a single position.
pub const MIN_TRADE_NOTIONAL: Decimal = dec!(10.00);

/// Result of a sizing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sizing {
    /// Currency committed to the position.
    pub notional: Decimal,
    /// Quantity at the entry price, 8 fractional digits.
    pub quantity: Decimal,
}

/// Computes trade notional and quantity from balance, tier risk fraction,
/// and how many positions are already open.
pub struct PositionSizer {
    risk_per_trade: Decimal,
}

impl PositionSizer {
    pub fn new(config: &TierConfig) -> Self {
        Self {
            risk_per_trade: config.risk_per_trade,
        }
    }

    /// Balance-tiered size fraction: larger accounts commit a larger share.
    fn size_fraction(balance: Decimal) -> Decimal {
        if balance < dec!(100) {
            dec!(0.03)
        } else if balance < dec!(500) {
            dec!(0.05)
        } else if balance < dec!(2000) {
            dec!(0.08)
        } else if balance < dec!(10000) {
            dec!(0.12)
        } else {
            dec!(0.15)
        }
    }

    /// Each already-open position shaves 10% off the size, floored at 50%.
    fn position_decay(open_count: u32) -> Decimal {
        let decay = Decimal::ONE - Decimal::from(open_count) * dec!(0.1);
        decay.max(dec!(0.5))
    }

    /// Size a candidate position.
    ///
    /// Returns `InsufficientBalance` when the balance cannot cover the
    /// minimum notional; callers skip the trade rather than failing the
    /// run. A zero or negative quantity is likewise a skip, reported as
    /// `Ok(None)`.
    pub fn calculate(
        &self,
        balance: Decimal,
        entry_price: Decimal,
        open_count: u32,
    ) -> Result<Option<Sizing>, EngineError> {
        if balance < MIN_TRADE_NOTIONAL {
            return Err(EngineError::InsufficientBalance {
                balance,
                minimum: MIN_TRADE_NOTIONAL,
            });
        }

        let risk_amount = balance * self.risk_per_trade;
        let sized = balance * Self::size_fraction(balance);
        let mut notional = risk_amount.min(sized) * Self::position_decay(open_count);

        notional = notional.max(MIN_TRADE_NOTIONAL);
        notional = notional.min(balance * dec!(0.95));

        if entry_price <= Decimal::ZERO {
            return Ok(None);
        }

        let quantity = quantize_price(notional / entry_price);
        if quantity <= Decimal::ZERO {
            return Ok(None);
        }

        Ok(Some(Sizing { notional, quantity }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Tier, TierConfig};
    use crate::models::PRICE_SCALE;

    fn sizer() -> PositionSizer {
        PositionSizer::new(&TierConfig::for_tier(Tier::Basic))
    }

    #[test]
    fn balance_below_minimum_is_insufficient() {
        let err = sizer().calculate(dec!(9.99), dec!(67000), 0).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientBalance { .. }));
    }

    #[test]
    fn small_balance_is_clamped_to_minimum_notional() {
        // 1000 * min(2% risk, 8% band) * decay 1.0 = 20.00
        let sizing = sizer().calculate(dec!(1000), dec!(67000), 0).unwrap().unwrap();
        assert_eq!(sizing.notional, dec!(20.0));
        assert_eq!(sizing.quantity.scale(), PRICE_SCALE);
        assert_eq!(sizing.quantity, dec!(0.00029850));

        // 50 * 2% = 1.00 -> floored at the 10.00 minimum
        let sizing = sizer().calculate(dec!(50), dec!(100), 0).unwrap().unwrap();
        assert_eq!(sizing.notional, MIN_TRADE_NOTIONAL);
    }

    #[test]
    fn notional_never_exceeds_95_percent_of_balance() {
        let sizing = sizer().calculate(dec!(10.00), dec!(1), 0).unwrap().unwrap();
        assert_eq!(sizing.notional, dec!(9.5000));
    }

    #[test]
    fn open_positions_decay_the_size() {
        let base = sizer().calculate(dec!(5000), dec!(100), 0).unwrap().unwrap();
        let decayed = sizer().calculate(dec!(5000), dec!(100), 3).unwrap().unwrap();
        // decay: 1 - 0.3 = 0.7
        assert_eq!(decayed.notional, base.notional * dec!(0.7));

        // decay floors at 0.5 no matter how many positions are open
        let floored = sizer().calculate(dec!(5000), dec!(100), 9).unwrap().unwrap();
        assert_eq!(floored.notional, base.notional * dec!(0.5));
    }

    #[test]
    fn size_fraction_bands_are_applied() {
        // 20000 balance: min(risk 2% = 400, band 15% = 3000) = 400
        let sizing = sizer().calculate(dec!(20000), dec!(100), 0).unwrap().unwrap();
        assert_eq!(sizing.notional, dec!(400.00));
    }

    #[test]
    fn zero_entry_price_is_a_skip() {
        assert!(sizer().calculate(dec!(1000), Decimal::ZERO, 0).unwrap().is_none());
    }
}
