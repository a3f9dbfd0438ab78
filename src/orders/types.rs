//! Core types for order management.
//!
//! Provides type-safe order identifiers and lifecycle state tracking.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Direction, Offset};

/// Type-safe order identifier (venue-assigned or locally generated).
///
/// Uses a newtype wrapper to prevent accidentally mixing order IDs with
/// other string types at compile time. `OrderId` is `Clone`, `Send` and
/// `Sync`, safe across async boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(String);

impl OrderId {
    /// Create a new OrderId from any string-like type.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let s: String = id.into();
        debug_assert!(!s.is_empty(), "OrderId cannot be empty");
        if s.is_empty() {
            tracing::warn!("Creating OrderId with empty string - this may cause tracking issues");
        }
        Self(s)
    }

    /// Get the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for OrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Order lifecycle states.
///
/// `Pending → Submitted → PartialFilled* → FullyFilled | Cancelled |
/// Rejected`, with `Submitted | PartialFilled → CancelSubmitted →
/// Cancelled` as the cancel path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Created locally, not yet accepted for submission
    Pending,
    /// Accepted by the ledger and forwarded to the venue
    Submitted,
    /// Some quantity executed, remainder still resting
    PartialFilled,
    /// All quantity executed
    FullyFilled,
    /// Cancel request sent, awaiting venue acknowledgment
    CancelSubmitted,
    /// Cancelled by us or by the venue
    Cancelled,
    /// Rejected by the venue or by risk checks
    Rejected,
}

impl OrderStatus {
    /// Returns true if no further updates are expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FullyFilled | Self::Cancelled | Self::Rejected)
    }

    /// Returns true if the order may still receive fills.
    pub fn may_fill(&self) -> bool {
        matches!(
            self,
            Self::Submitted | Self::PartialFilled | Self::CancelSubmitted
        )
    }

    /// Returns true for orders the evaluator considers resting
    /// (Submitted or PartialFilled; CancelSubmitted is already in flight).
    pub fn is_resting(&self) -> bool {
        matches!(self, Self::Submitted | Self::PartialFilled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Submitted => write!(f, "Submitted"),
            Self::PartialFilled => write!(f, "PartialFilled"),
            Self::FullyFilled => write!(f, "FullyFilled"),
            Self::CancelSubmitted => write!(f, "CancelSubmitted"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Rejected => write!(f, "Rejected"),
        }
    }
}

/// Complete tracked order with all lifecycle metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub direction: Direction,
    pub offset: Offset,
    /// Limit price the order rests at
    pub price: Decimal,
    /// Requested volume in contracts
    pub volume: u64,
    /// Volume filled so far (0 ≤ filled_volume ≤ volume)
    pub filled_volume: u64,
    /// Volume-weighted average fill price (None until the first fill)
    pub avg_fill_price: Option<Decimal>,
    pub status: OrderStatus,
    pub submit_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    /// Resubmission attempts after gateway failures
    pub retry_count: u32,
}

impl Order {
    /// Create a new order in Pending state.
    #[must_use]
    pub fn new(
        id: OrderId,
        symbol: String,
        direction: Direction,
        offset: Offset,
        price: Decimal,
        volume: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            symbol,
            direction,
            offset,
            price,
            volume,
            filled_volume: 0,
            avg_fill_price: None,
            status: OrderStatus::Pending,
            submit_time: now,
            last_update_time: now,
            retry_count: 0,
        }
    }

    /// Unfilled volume still resting at the venue.
    #[must_use]
    pub fn remaining_volume(&self) -> u64 {
        self.volume - self.filled_volume
    }

    /// Fill rate in [0, 1].
    #[must_use]
    pub fn fill_rate(&self) -> Decimal {
        if self.volume == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.filled_volume) / Decimal::from(self.volume)
        }
    }

    /// Check if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
