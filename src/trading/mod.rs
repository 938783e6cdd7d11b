//! Position lifecycle: sizing, P&L, and the open/close engine.

mod engine;
mod pnl;
mod sizer;

pub use engine::{ClosePassReport, LifecycleEngine, OpenOutcome, SkipReason};
pub use pnl::{compute_pnl, FEE_PERCENT};
pub use sizer::{PositionSizer, Sizing, MIN_TRADE_NOTIONAL};
