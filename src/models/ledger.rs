//! Append-only ledger of balance-affecting events.
//!
//! Amounts are stored as absolute values; the kind carries the sign. The
//! sum of signed completed entries plus the account's initial balance must
//! equal the account balance at any instant.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// Kind of balance-affecting event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    Deposit,
    Withdrawal,
    Commission,
    BotProfit,
    BotLoss,
    BotPurchase,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Deposit => "deposit",
            LedgerKind::Withdrawal => "withdrawal",
            LedgerKind::Commission => "commission",
            LedgerKind::BotProfit => "bot_profit",
            LedgerKind::BotLoss => "bot_loss",
            LedgerKind::BotPurchase => "bot_purchase",
        }
    }

    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "deposit" => Ok(LedgerKind::Deposit),
            "withdrawal" => Ok(LedgerKind::Withdrawal),
            "commission" => Ok(LedgerKind::Commission),
            "bot_profit" => Ok(LedgerKind::BotProfit),
            "bot_loss" => Ok(LedgerKind::BotLoss),
            "bot_purchase" => Ok(LedgerKind::BotPurchase),
            other => Err(EngineError::Decode(format!("unknown ledger kind '{other}'"))),
        }
    }

    /// Sign applied to the absolute amount when reconstructing balance.
    pub fn sign(&self) -> Decimal {
        match self {
            LedgerKind::Deposit | LedgerKind::BotProfit => Decimal::ONE,
            LedgerKind::Withdrawal
            | LedgerKind::Commission
            | LedgerKind::BotLoss
            | LedgerKind::BotPurchase => Decimal::NEGATIVE_ONE,
        }
    }
}

/// Settlement status of a ledger entry. Completed entries are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Pending,
    Processing,
    Completed,
    Rejected,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Pending => "pending",
            LedgerStatus::Processing => "processing",
            LedgerStatus::Completed => "completed",
            LedgerStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "pending" => Ok(LedgerStatus::Pending),
            "processing" => Ok(LedgerStatus::Processing),
            "completed" => Ok(LedgerStatus::Completed),
            "rejected" => Ok(LedgerStatus::Rejected),
            other => Err(EngineError::Decode(format!("unknown ledger status '{other}'"))),
        }
    }
}

/// One balance-affecting event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: LedgerKind,
    /// Absolute amount, 2 fractional digits.
    pub amount: Decimal,
    pub status: LedgerStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    pub fn new(account_id: Uuid, kind: LedgerKind, amount: Decimal, status: LedgerStatus) -> Self {
        let now = Utc::now();
        let processed_at = (status == LedgerStatus::Completed).then_some(now);
        Self {
            id: Uuid::new_v4(),
            account_id,
            kind,
            amount,
            status,
            created_at: now,
            processed_at,
        }
    }

    /// Signed contribution of this entry to the account balance; zero
    /// unless completed.
    pub fn signed_amount(&self) -> Decimal {
        if self.status == LedgerStatus::Completed {
            self.kind.sign() * self.amount
        } else {
            Decimal::ZERO
        }
    }
}
