//! Simulated Trading Bot Engine
//!
//! Drives tiered bot subscriptions through a stochastic market model:
//! weighted symbol selection, risk-based sizing, probabilistic closes, and
//! double-entry style ledger accounting with per-account locking. The crate
//! is a library; schedulers and request handlers invoke it from outside.

pub mod config;
pub mod db;
pub mod error;
pub mod market;
pub mod models;
pub mod notify;
pub mod orchestrator;
pub mod trading;

pub use config::{Tier, TierConfig};
pub use db::{Database, LedgerAccountant};
pub use error::{EngineError, Result};
pub use market::{CoinGeckoOracle, MarketSimulator, PriceOracle, StaticOracle};
pub use notify::{NotificationPort, TracingNotifier};
pub use orchestrator::{CycleReport, OrchestratorConfig, SimulationOrchestrator};
pub use trading::{LifecycleEngine, PositionSizer};
