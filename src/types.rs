//! Common Types Module
//!
//! Shared event and command types used across the codebase to avoid
//! circular dependencies. These are the boundary types exchanged with the
//! external collaborators: the market-data layer, the strategy layer and
//! the execution gateway.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::orders::OrderId;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// The opposite direction. Closing trades drain the opposite side's
    /// position book.
    #[must_use]
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// Returns true for the buy side of the market (Long trades buy).
    #[must_use]
    pub fn is_buy(&self) -> bool {
        matches!(self, Direction::Long)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

/// Whether a trade opens a new position or closes an existing one.
///
/// `CloseToday`/`CloseYesterday` matter on venues that settle same-day and
/// prior-day volume differently; generic `Close` drains today's volume
/// first and spills into yesterday's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Offset {
    Open,
    Close,
    CloseToday,
    CloseYesterday,
}

impl Offset {
    /// Returns true for any of the closing offsets.
    #[must_use]
    pub fn is_close(&self) -> bool {
        !matches!(self, Offset::Open)
    }
}

impl std::fmt::Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Offset::Open => write!(f, "open"),
            Offset::Close => write!(f, "close"),
            Offset::CloseToday => write!(f, "close_today"),
            Offset::CloseYesterday => write!(f, "close_yesterday"),
        }
    }
}

/// A market data update (price tick) from the market-data layer.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketTick {
    /// The trading symbol (e.g., "IC2509").
    pub symbol: String,
    /// Last traded price.
    pub price: Decimal,
    /// Exchange timestamp of the tick.
    pub timestamp: DateTime<Utc>,
}

/// A fill report from the execution gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct FillReport {
    pub order_id: OrderId,
    pub symbol: String,
    pub price: Decimal,
    pub qty: u64,
    pub timestamp: DateTime<Utc>,
}

/// Venue acknowledgment that an order was accepted.
#[derive(Debug, Clone)]
pub struct OrderAck {
    pub order_id: OrderId,
    /// Venue-reported status string, kept verbatim for audit logs.
    pub status: String,
}

/// Venue rejection of an order.
#[derive(Debug, Clone)]
pub struct OrderReject {
    pub order_id: OrderId,
    pub error: String,
}

/// A new-order request from the strategy/signal layer.
#[derive(Debug, Clone)]
pub struct NewOrderRequest {
    pub symbol: String,
    pub direction: Direction,
    pub offset: Offset,
    pub price: Decimal,
    pub volume: u64,
}

/// Command to the execution gateway: submit a new order.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOrder {
    pub order_id: OrderId,
    pub symbol: String,
    pub direction: Direction,
    pub offset: Offset,
    pub price: Decimal,
    pub volume: u64,
}
