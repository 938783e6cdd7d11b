//! Per-cycle fan-out across all bot-enabled accounts.
//!
//! Each account is processed in its own unit of work; one account's
//! failure is logged with its identity and never aborts the others. Base
//! prices are fetched once per cycle through a short-TTL cache, with a
//! built-in static table as the last resort.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::TierConfig;
use crate::error::Result;
use crate::market::{fallback_prices, MarketSimulator, PriceOracle, TtlCache};
use crate::models::Account;
use crate::trading::{ClosePassReport, LifecycleEngine, OpenOutcome};

const PRICE_CACHE_KEY: &str = "base_prices";

/// Orchestrator tuning knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Row limit passed to the price oracle.
    pub price_limit: u32,
    /// How long one oracle response is reused.
    pub price_ttl: Duration,
    /// Base seed for reproducible cycles; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            price_limit: 50,
            price_ttl: Duration::from_secs(30),
            seed: None,
        }
    }
}

/// What one cycle did across all accounts.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Bot-enabled accounts considered.
    pub accounts: usize,
    /// Positions opened across all accounts.
    pub opened: usize,
    /// Positions closed across all accounts.
    pub closed: usize,
    /// Accounts whose unit of work failed and was isolated.
    pub failed: usize,
}

/// Runs the engine across every simulatable account.
pub struct SimulationOrchestrator {
    engine: LifecycleEngine,
    oracle: Arc<dyn PriceOracle>,
    cache: Arc<TtlCache<String, HashMap<String, Decimal>>>,
    config: OrchestratorConfig,
}

impl SimulationOrchestrator {
    pub fn new(
        engine: LifecycleEngine,
        oracle: Arc<dyn PriceOracle>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            engine,
            oracle,
            cache: Arc::new(TtlCache::new()),
            config,
        }
    }

    pub fn engine(&self) -> &LifecycleEngine {
        &self.engine
    }

    /// One simulation cycle: for every bot-enabled account, run the close
    /// pass then the open pass in a spawned unit of work.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let simulator = Arc::new(MarketSimulator::new(self.base_prices().await));
        let rows = self.engine.accountant().db().simulatable_accounts().await?;

        let mut report = CycleReport {
            accounts: rows.len(),
            ..Default::default()
        };

        let mut handles = Vec::with_capacity(rows.len());
        for row in rows {
            let account = match row.into_model() {
                Ok(account) => account,
                Err(e) => {
                    error!(error = %e, "Skipping account with undecodable row");
                    report.failed += 1;
                    continue;
                }
            };
            let Some(tier) = account.tier else {
                warn!(account = %account.id, "Bot enabled but no tier set, skipping");
                report.failed += 1;
                continue;
            };

            let engine = self.engine.clone();
            let simulator = Arc::clone(&simulator);
            let seed = self.config.seed;
            handles.push(tokio::spawn(async move {
                let id = account.id;
                let result = simulate_account(engine, account, tier, simulator, seed).await;
                (id, result)
            }));
        }

        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok((_, Ok((close, opened)))) => {
                    report.closed += close.closed;
                    report.opened += opened;
                }
                Ok((id, Err(e))) => {
                    if e.is_transient() {
                        warn!(account = %id, error = %e, "Account deferred to next cycle");
                    } else {
                        error!(account = %id, error = %e, "Account simulation failed");
                    }
                    report.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "Account worker panicked");
                    report.failed += 1;
                }
            }
        }

        info!(
            accounts = report.accounts,
            opened = report.opened,
            closed = report.closed,
            failed = report.failed,
            "Simulation cycle complete"
        );
        Ok(report)
    }

    /// Cycle variant with grouped writes: accounts are processed in turn
    /// and each account's closes land in a single transaction, still under
    /// that account's own lock.
    pub async fn run_cycle_bulk(&self) -> Result<CycleReport> {
        let simulator = MarketSimulator::new(self.base_prices().await);
        let rows = self.engine.accountant().db().simulatable_accounts().await?;

        let mut report = CycleReport {
            accounts: rows.len(),
            ..Default::default()
        };

        for row in rows {
            let account = match row.into_model() {
                Ok(account) => account,
                Err(e) => {
                    error!(error = %e, "Skipping account with undecodable row");
                    report.failed += 1;
                    continue;
                }
            };
            let Some(tier) = account.tier else {
                warn!(account = %account.id, "Bot enabled but no tier set, skipping");
                report.failed += 1;
                continue;
            };

            let config = TierConfig::for_tier(tier);
            let mut rng = self.rng_for(account.id);

            let outcome: Result<(ClosePassReport, usize)> = async {
                let close = self
                    .engine
                    .close_pass_bulk(&account, &config, &simulator, Utc::now(), &mut rng)
                    .await?;
                let outcomes = self
                    .engine
                    .open_pass(&account, &config, &simulator, &mut rng)
                    .await?;
                Ok((close, count_opened(&outcomes)))
            }
            .await;

            match outcome {
                Ok((close, opened)) => {
                    report.closed += close.closed;
                    report.opened += opened;
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(account = %account.id, error = %e, "Account deferred to next cycle");
                    } else {
                        error!(account = %account.id, error = %e, "Account simulation failed");
                    }
                    report.failed += 1;
                }
            }
        }

        info!(
            accounts = report.accounts,
            opened = report.opened,
            closed = report.closed,
            failed = report.failed,
            "Bulk simulation cycle complete"
        );
        Ok(report)
    }

    /// Base prices for this cycle: cache, then oracle, then the static
    /// fallback table. Never fails the run.
    async fn base_prices(&self) -> HashMap<String, Decimal> {
        if let Some(prices) = self.cache.get(&PRICE_CACHE_KEY.to_string()) {
            return prices;
        }

        match self.oracle.base_prices(self.config.price_limit).await {
            Ok(prices) if !prices.is_empty() => {
                self.cache
                    .set(PRICE_CACHE_KEY.to_string(), prices.clone(), self.config.price_ttl);
                prices
            }
            Ok(_) => {
                warn!("Oracle returned no prices, using fallback table");
                fallback_prices()
            }
            Err(e) => {
                warn!(error = %e, "Oracle unavailable, using fallback table");
                fallback_prices()
            }
        }
    }

    fn rng_for(&self, account_id: Uuid) -> StdRng {
        rng_for_account(self.config.seed, account_id)
    }
}

/// One account's unit of work: close pass, then open pass.
async fn simulate_account(
    engine: LifecycleEngine,
    account: Account,
    tier: crate::config::Tier,
    simulator: Arc<MarketSimulator>,
    seed: Option<u64>,
) -> Result<(ClosePassReport, usize)> {
    let config = TierConfig::for_tier(tier);
    let mut rng = rng_for_account(seed, account.id);

    let close = engine
        .close_pass(&account, &config, &simulator, Utc::now(), &mut rng)
        .await?;
    let outcomes = engine
        .open_pass(&account, &config, &simulator, &mut rng)
        .await?;

    Ok((close, count_opened(&outcomes)))
}

fn count_opened(outcomes: &[OpenOutcome]) -> usize {
    outcomes
        .iter()
        .filter(|o| matches!(o, OpenOutcome::Opened(_)))
        .count()
}

/// Derive a per-account RNG so accounts stay independent but a cycle is
/// reproducible from the base seed.
fn rng_for_account(seed: Option<u64>, account_id: Uuid) -> StdRng {
    match seed {
        Some(seed) => {
            let bits = account_id.as_u128();
            StdRng::seed_from_u64(seed ^ (bits >> 64) as u64 ^ bits as u64)
        }
        None => StdRng::from_entropy(),
    }
}
