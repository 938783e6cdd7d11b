//! Market side of the simulation: price oracle, TTL cache, and the
//! stochastic price/exit model.

mod cache;
mod oracle;
mod simulator;

pub use cache::TtlCache;
pub use oracle::{fallback_prices, CoinGeckoOracle, PriceOracle, StaticOracle};
pub use simulator::{profit_target, MarketSimulator};
pub(crate) use simulator::symbol_weight;
