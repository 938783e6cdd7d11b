//! Trade event notifications.
//!
//! The engine emits an event for every open and close; delivery is behind a
//! trait so callers can wire up a real channel. Delivery failures are logged
//! and swallowed, never allowed to fail the trade that triggered them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::models::{Position, Side};

/// Immutable snapshot of a trade at the moment of an event.
#[derive(Debug, Clone)]
pub struct TradeSnapshot {
    pub position_id: Uuid,
    pub account_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub exit_price: Option<Decimal>,
    pub quantity: Decimal,
    pub profit_loss: Decimal,
    pub profit_loss_percent: Decimal,
    pub balance_after: Decimal,
    pub at: DateTime<Utc>,
}

impl TradeSnapshot {
    pub fn opened(position: &Position, balance_after: Decimal) -> Self {
        Self {
            position_id: position.id,
            account_id: position.account_id,
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.entry_price,
            exit_price: None,
            quantity: position.quantity,
            profit_loss: Decimal::ZERO,
            profit_loss_percent: Decimal::ZERO,
            balance_after,
            at: position.opened_at,
        }
    }

    pub fn closed(position: &Position, balance_after: Decimal) -> Self {
        Self {
            position_id: position.id,
            account_id: position.account_id,
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.entry_price,
            exit_price: position.exit_price,
            quantity: position.quantity,
            profit_loss: position.profit_loss,
            profit_loss_percent: position.profit_loss_percent,
            balance_after,
            at: position.closed_at.unwrap_or(position.opened_at),
        }
    }
}

/// What happened to the trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeEvent {
    Opened,
    Closed,
}

/// Delivery channel for trade events.
#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn notify(&self, event: TradeEvent, snapshot: &TradeSnapshot);
}

/// Default channel: structured log lines only.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationPort for TracingNotifier {
    async fn notify(&self, event: TradeEvent, snapshot: &TradeSnapshot) {
        match event {
            TradeEvent::Opened => info!(
                account = %snapshot.account_id,
                position = %snapshot.position_id,
                symbol = %snapshot.symbol,
                side = %snapshot.side.as_str(),
                entry = %snapshot.entry_price,
                quantity = %snapshot.quantity,
                "Position opened"
            ),
            TradeEvent::Closed => info!(
                account = %snapshot.account_id,
                position = %snapshot.position_id,
                symbol = %snapshot.symbol,
                pnl = %snapshot.profit_loss,
                pnl_percent = %snapshot.profit_loss_percent,
                balance = %snapshot.balance_after,
                "Position closed"
            ),
        }
    }
}
