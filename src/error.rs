//! Engine error taxonomy.
//!
//! Skip conditions (missing price, zero quantity, position limit) are not
//! errors; they are reported through [`crate::trading::SkipReason`]. The
//! variants here are the failures that abort a unit of work: fatal
//! configuration errors, transient lock contention, and storage faults.

use rust_decimal::Decimal;
use uuid::Uuid;

/// Errors produced by the simulation engine and its persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The account references a subscription tier outside the known set.
    /// Fatal for that account's run; other accounts are unaffected.
    #[error("unknown subscription tier '{0}'")]
    UnknownTier(String),

    /// Balance is below the minimum trade notional. Callers skip the trade.
    #[error("balance {balance} below minimum trade notional {minimum}")]
    InsufficientBalance { balance: Decimal, minimum: Decimal },

    /// Another worker holds the account's lock. Transient: the cycle is
    /// abandoned and picked up again on the next schedule, never retried
    /// in a tight loop.
    #[error("account {0} is locked by another worker")]
    LockBusy(Uuid),

    /// Attempted to close a position that is already CLOSED.
    #[error("position {0} is already closed")]
    AlreadyClosed(Uuid),

    #[error("no active session for account {0}")]
    NoActiveSession(Uuid),

    #[error("account {0} not found")]
    AccountNotFound(Uuid),

    /// A request-layer amount that must be positive was not.
    #[error("invalid amount {0}")]
    InvalidAmount(Decimal),

    /// A ledger entry could not be settled (wrong state, unknown id).
    #[error("ledger entry {id} is not pending (status '{status}')")]
    EntryNotPending { id: Uuid, status: String },

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    /// A stored row failed to parse back into a domain value.
    #[error("corrupt record: {0}")]
    Decode(String),
}

impl EngineError {
    /// Transient failures are re-attempted on the next scheduled cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::LockBusy(_))
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
