//! Subscriber account: owner of positions, sessions, and the balance.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Tier;

/// One subscriber account.
///
/// `balance` must equal `initial_balance` plus the sum of signed completed
/// ledger entries; every balance mutation is paired with a ledger entry in
/// the same atomic unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    /// Current balance, 2 fractional digits.
    pub balance: Decimal,
    /// Balance at account creation; base for ledger reconstruction.
    pub initial_balance: Decimal,
    /// Purchased bot tier; `None` when no bot subscription is active.
    pub tier: Option<Tier>,
    /// Master switch for bot trading.
    pub bot_enabled: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Whether the simulation should pick this account up.
    pub fn is_simulatable(&self) -> bool {
        self.is_active && self.bot_enabled && self.tier.is_some()
    }
}
