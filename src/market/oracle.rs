//! Price oracle: supplies symbol → base price mappings.
//!
//! The oracle is deliberately allowed to be stale or empty; callers fall
//! back to [`fallback_prices`] rather than failing the run.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const COINGECKO_API_BASE: &str = "https://api.coingecko.com/api/v3";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of base prices for the simulator.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Fetch up to `limit` symbol → price pairs. An empty map signals
    /// an oracle outage; callers must substitute the fallback table.
    async fn base_prices(&self, limit: u32) -> Result<HashMap<String, Decimal>>;
}

/// Built-in static price table used when the oracle is unavailable.
pub fn fallback_prices() -> HashMap<String, Decimal> {
    [
        ("BTC/USDT", dec!(67000.00)),
        ("ETH/USDT", dec!(3500.00)),
        ("BNB/USDT", dec!(580.00)),
        ("SOL/USDT", dec!(145.00)),
        ("XRP/USDT", dec!(0.52)),
        ("ADA/USDT", dec!(0.38)),
        ("DOGE/USDT", dec!(0.085)),
        ("DOT/USDT", dec!(6.20)),
        ("MATIC/USDT", dec!(0.72)),
        ("AVAX/USDT", dec!(28.50)),
    ]
    .into_iter()
    .map(|(symbol, price)| (symbol.to_string(), price))
    .collect()
}

#[derive(Debug, Deserialize)]
struct MarketRow {
    symbol: String,
    current_price: Option<f64>,
}

/// Read-only CoinGecko markets client.
pub struct CoinGeckoOracle {
    client: Client,
    base_url: String,
}

impl CoinGeckoOracle {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: COINGECKO_API_BASE.to_string(),
        })
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl PriceOracle for CoinGeckoOracle {
    async fn base_prices(&self, limit: u32) -> Result<HashMap<String, Decimal>> {
        let url = format!(
            "{}/coins/markets?vs_currency=usd&order=market_cap_desc&per_page={}&page=1&sparkline=false",
            self.base_url, limit
        );

        debug!(url = %url, "Fetching base prices");

        let rows: Vec<MarketRow> = self
            .client
            .get(&url)
            .send()
            .await
            .context("Oracle request failed")?
            .error_for_status()
            .context("Oracle returned error status")?
            .json()
            .await
            .context("Failed to parse oracle response")?;

        let prices = rows
            .into_iter()
            .filter_map(|row| {
                let price = Decimal::from_f64(row.current_price?)?;
                if row.symbol.is_empty() || price <= Decimal::ZERO {
                    return None;
                }
                Some((format!("{}/USDT", row.symbol.to_uppercase()), price))
            })
            .collect();

        Ok(prices)
    }
}

/// Fixed in-memory oracle for tests and offline runs.
pub struct StaticOracle {
    prices: HashMap<String, Decimal>,
}

impl StaticOracle {
    pub fn new(prices: HashMap<String, Decimal>) -> Self {
        Self { prices }
    }

    /// Oracle pre-loaded with the fallback table.
    pub fn with_fallback() -> Self {
        Self::new(fallback_prices())
    }
}

#[async_trait]
impl PriceOracle for StaticOracle {
    async fn base_prices(&self, limit: u32) -> Result<HashMap<String, Decimal>> {
        Ok(self.prices.iter().take(limit as usize).map(|(k, v)| (k.clone(), *v)).collect())
    }
}
