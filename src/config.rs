//! Subscription tiers and their immutable parameter bundles.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::EngineError;

/// Bot subscription tier. Higher tiers win more often, target wider profit
/// ranges, and are allowed more concurrent positions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Basic,
    Premium,
    Specialist,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Basic, Tier::Premium, Tier::Specialist];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Basic => "basic",
            Tier::Premium => "premium",
            Tier::Specialist => "specialist",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Tier::Basic),
            "premium" => Ok(Tier::Premium),
            "specialist" => Ok(Tier::Specialist),
            other => Err(EngineError::UnknownTier(other.to_string())),
        }
    }
}

/// Immutable parameter bundle for one tier.
///
/// Percent ranges are `(low, high)` with `low < high`; the loss range is
/// strictly negative. Probabilities (`win_rate`, tail chances) are on the
/// 0-100 scale the sampler draws against.
#[derive(Debug, Clone)]
pub struct TierConfig {
    pub tier: Tier,
    /// Percentage of closed trades that are winners, 0-100.
    pub win_rate: f64,
    /// Winning profit target range in percent.
    pub profit_range: (f64, f64),
    /// Losing target range in percent, strictly negative.
    pub loss_range: (f64, f64),
    /// Chance (0-100) a winner samples the wider high-yield range instead.
    pub high_yield_chance: f64,
    pub high_profit_range: (f64, f64),
    /// Chance (0-100) a loser samples the wider high-loss range instead.
    pub high_loss_chance: f64,
    pub high_loss_range: (f64, f64),
    /// Positions younger than this are never closed.
    pub min_open_duration: Duration,
    /// Positions older than this are closed unconditionally.
    pub max_open_duration: Duration,
    /// Cap on concurrently OPEN positions per account.
    pub max_open_positions: u32,
    /// How many open attempts a single cycle makes, inclusive range.
    pub trades_per_run: (u32, u32),
    /// Fraction of balance risked per trade.
    pub risk_per_trade: Decimal,
    /// One-time subscription price charged on bot purchase.
    pub price: Decimal,
}

impl TierConfig {
    /// Look up the fixed bundle for a tier. Pure, no side effects.
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Basic => TierConfig {
                tier,
                win_rate: 72.0,
                profit_range: (0.4, 2.8),
                loss_range: (-2.2, -0.6),
                high_yield_chance: 0.5,
                high_profit_range: (3.0, 8.0),
                high_loss_chance: 2.0,
                high_loss_range: (-8.0, -3.0),
                min_open_duration: Duration::minutes(1),
                max_open_duration: Duration::minutes(12),
                max_open_positions: 3,
                trades_per_run: (1, 1),
                risk_per_trade: dec!(0.02),
                price: dec!(250.00),
            },
            Tier::Premium => TierConfig {
                tier,
                win_rate: 82.0,
                profit_range: (0.8, 4.5),
                loss_range: (-2.0, -0.5),
                high_yield_chance: 1.0,
                high_profit_range: (5.0, 12.0),
                high_loss_chance: 1.0,
                high_loss_range: (-10.0, -4.0),
                min_open_duration: Duration::minutes(2),
                max_open_duration: Duration::minutes(22),
                max_open_positions: 5,
                trades_per_run: (1, 1),
                risk_per_trade: dec!(0.03),
                price: dec!(500.00),
            },
            Tier::Specialist => TierConfig {
                tier,
                win_rate: 88.0,
                profit_range: (1.2, 6.5),
                loss_range: (-2.5, -0.8),
                high_yield_chance: 2.0,
                high_profit_range: (8.0, 18.0),
                high_loss_chance: 0.5,
                high_loss_range: (-12.0, -5.0),
                min_open_duration: Duration::minutes(4),
                max_open_duration: Duration::minutes(35),
                max_open_positions: 8,
                trades_per_run: (1, 1),
                risk_per_trade: dec!(0.04),
                price: dec!(1000.00),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tier_is_rejected() {
        let err = "platinum".parse::<Tier>().unwrap_err();
        assert!(matches!(err, EngineError::UnknownTier(s) if s == "platinum"));
    }

    #[test]
    fn known_tiers_round_trip() {
        for tier in Tier::ALL {
            assert_eq!(tier.as_str().parse::<Tier>().unwrap(), tier);
        }
    }

    #[test]
    fn tiers_are_monotonic() {
        let configs: Vec<_> = Tier::ALL.iter().map(|t| TierConfig::for_tier(*t)).collect();

        for pair in configs.windows(2) {
            let (lo, hi) = (&pair[0], &pair[1]);
            assert!(hi.win_rate > lo.win_rate);
            assert!(hi.profit_range.0 > lo.profit_range.0);
            assert!(hi.profit_range.1 > lo.profit_range.1);
            assert!(hi.max_open_positions > lo.max_open_positions);
            assert!(hi.risk_per_trade > lo.risk_per_trade);
            assert!(hi.price > lo.price);
        }
    }

    #[test]
    fn ranges_are_sane() {
        for tier in Tier::ALL {
            let cfg = TierConfig::for_tier(tier);
            assert!(cfg.profit_range.0 < cfg.profit_range.1);
            assert!(cfg.loss_range.0 < cfg.loss_range.1);
            assert!(cfg.loss_range.1 < 0.0, "loss range must be strictly negative");
            assert!(cfg.high_loss_range.1 < 0.0);
            assert!(cfg.min_open_duration < cfg.max_open_duration);
            assert!(cfg.max_open_positions >= 1);
            assert!(cfg.risk_per_trade >= dec!(0.02) && cfg.risk_per_trade <= dec!(0.04));
        }
    }
}
