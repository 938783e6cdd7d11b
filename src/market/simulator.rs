//! Stochastic price and exit modeling.
//!
//! Every function here is a pure function of its inputs and the threaded
//! RNG handle, so runs are reproducible from a seed in tests.

use std::collections::HashMap;

use rand::distributions::Distribution;
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use statrs::distribution::{Normal, Triangular};

use crate::config::TierConfig;
use crate::models::{quantize_money, quantize_price, Side};

/// Volatility coefficient per symbol family; majors move less.
fn volatility(symbol: &str) -> f64 {
    if symbol.contains("BTC") || symbol.contains("ETH") {
        0.008
    } else if symbol.contains("BNB") || symbol.contains("SOL") {
        0.012
    } else {
        0.015
    }
}

/// Majors (BTC/ETH families) get 3x the selection weight.
pub(crate) fn symbol_weight(symbol: &str) -> u32 {
    if symbol.contains("BTC") || symbol.contains("ETH") {
        3
    } else {
        1
    }
}

/// Zero-mean Gaussian sample; degenerate sigma yields no noise.
fn gauss<R: Rng + ?Sized>(rng: &mut R, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }
    Normal::new(0.0, std_dev)
        .map(|n| n.sample(rng))
        .unwrap_or(0.0)
}

/// Triangular sample; falls back to uniform if the mode is degenerate.
fn triangular<R: Rng + ?Sized>(rng: &mut R, low: f64, high: f64, mode: f64) -> f64 {
    Triangular::new(low, high, mode)
        .map(|t| t.sample(rng))
        .unwrap_or_else(|_| rng.gen_range(low..high))
}

/// Simulates market conditions from a mapping of base prices.
pub struct MarketSimulator {
    base_prices: HashMap<String, Decimal>,
}

impl MarketSimulator {
    pub fn new(base_prices: HashMap<String, Decimal>) -> Self {
        Self { base_prices }
    }

    /// Tradeable symbols in a stable order.
    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.base_prices.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }

    /// Derive a "current" price from the base price with a Gaussian
    /// perturbation scaled by the symbol's volatility class.
    ///
    /// Returns `None` when the symbol is absent or its base price is not
    /// positive; callers treat that as a skip, not a failure.
    pub fn current_price<R: Rng + ?Sized>(&self, symbol: &str, rng: &mut R) -> Option<Decimal> {
        let base = *self.base_prices.get(symbol)?;
        if base <= Decimal::ZERO {
            return None;
        }

        let noise = gauss(rng, volatility(symbol));
        let multiplier = Decimal::from_f64(1.0 + noise).unwrap_or(Decimal::ONE);

        Some(quantize_price(base * multiplier))
    }

    /// Compute an exit price for a close at `target_percent`.
    ///
    /// A small slippage (0.01%-0.05%) is applied against the direction of
    /// the target, then Gaussian noise scaled by how long the position was
    /// held. The result may be non-positive; callers floor it at
    /// `entry * 0.99`.
    pub fn realistic_exit<R: Rng + ?Sized>(
        &self,
        entry_price: Decimal,
        target_percent: Decimal,
        side: Side,
        duration_seconds: i64,
        rng: &mut R,
    ) -> Decimal {
        let target_fraction = target_percent / dec!(100);
        let mut exit = match side {
            Side::Long => entry_price * (Decimal::ONE + target_fraction),
            Side::Short => entry_price * (Decimal::ONE - target_fraction),
        };

        let slippage = rng.gen_range(0.0001..0.0005);
        let slip_multiplier = if target_percent > Decimal::ZERO {
            1.0 - slippage
        } else {
            1.0 + slippage
        };
        exit *= Decimal::from_f64(slip_multiplier).unwrap_or(Decimal::ONE);

        let noise = gauss(rng, 0.0005 * (duration_seconds as f64 / 300.0));
        exit *= Decimal::from_f64(1.0 + noise).unwrap_or(Decimal::ONE);

        quantize_price(exit)
    }
}

/// Sample a profit/loss target percent for one close.
///
/// With probability `win_rate` the target comes from the winning range
/// (with a small chance of the wider high-yield range); otherwise from the
/// losing range (with a small chance of the high-loss range). Truncated to
/// 2 fractional digits.
pub fn profit_target<R: Rng + ?Sized>(config: &TierConfig, rng: &mut R) -> Decimal {
    let is_winner = rng.gen_range(0.0..100.0) < config.win_rate;

    let percent = if is_winner {
        if rng.gen_range(0.0..100.0) < config.high_yield_chance {
            rng.gen_range(config.high_profit_range.0..config.high_profit_range.1)
        } else {
            let (low, high) = config.profit_range;
            triangular(rng, low, high, low * 1.3)
        }
    } else if rng.gen_range(0.0..100.0) < config.high_loss_chance {
        rng.gen_range(config.high_loss_range.0..config.high_loss_range.1)
    } else {
        let (low, high) = config.loss_range;
        triangular(rng, low, high, low * 0.7)
    };

    quantize_money(Decimal::from_f64(percent).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Tier, TierConfig};
    use crate::models::PRICE_SCALE;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sim() -> MarketSimulator {
        MarketSimulator::new(crate::market::fallback_prices())
    }

    #[test]
    fn missing_symbol_yields_no_price() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(sim().current_price("NOPE/USDT", &mut rng).is_none());
    }

    #[test]
    fn non_positive_base_yields_no_price() {
        let mut rng = StdRng::seed_from_u64(7);
        let sim = MarketSimulator::new(
            [("ZRO/USDT".to_string(), Decimal::ZERO)].into_iter().collect(),
        );
        assert!(sim.current_price("ZRO/USDT", &mut rng).is_none());
    }

    #[test]
    fn current_price_stays_near_base_with_full_scale() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let price = sim().current_price("BTC/USDT", &mut rng).unwrap();
            assert_eq!(price.scale(), PRICE_SCALE);
            // 0.8% sigma: anything beyond 10% from base means broken math
            assert!(price > dec!(60300) && price < dec!(73700), "price {price}");
        }
    }

    #[test]
    fn exit_tracks_target_direction() {
        let mut rng = StdRng::seed_from_u64(42);
        let entry = dec!(67000);

        for _ in 0..50 {
            let exit = sim().realistic_exit(entry, dec!(1.50), Side::Long, 60, &mut rng);
            assert_eq!(exit.scale(), PRICE_SCALE);
            // 1.5% win minus slippage/noise lands above entry
            assert!(exit > entry, "winning long exit {exit} below entry");
        }

        for _ in 0..50 {
            let exit = sim().realistic_exit(entry, dec!(1.50), Side::Short, 60, &mut rng);
            assert!(exit < entry, "winning short exit {exit} above entry");
        }
    }

    #[test]
    fn profit_target_respects_bounds_and_scale() {
        let config = TierConfig::for_tier(Tier::Basic);
        let mut rng = StdRng::seed_from_u64(9);

        let mut wins = 0u32;
        let total = 2000u32;
        for _ in 0..total {
            let target = profit_target(&config, &mut rng);
            assert_eq!(target.scale(), 2);
            assert!(target >= dec!(-8.00) && target <= dec!(8.00), "target {target}");
            if target > Decimal::ZERO {
                wins += 1;
            }
        }

        // win_rate 72 +/- sampling noise
        let rate = wins as f64 / total as f64 * 100.0;
        assert!((62.0..=82.0).contains(&rate), "observed win rate {rate}");
    }
}
